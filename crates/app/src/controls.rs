//! Keyboard and mouse bindings.
//!
//! | input | effect |
//! |-------|--------|
//! | W A S D | move the camera |
//! | left drag | turn the camera |
//! | arrows, O, L | move the light along x/z, y |
//! | R | toggle cube auto rotation |
//! | 1 2 3 | unlit, flat, shadowed lighting |
//! | 0, F1-F4 | no post-process, Laplace, blur, sepia, FXAA |
//! | M | sample the multi-sampled image in post-process |

use glam::Vec3;
use multipass_core::{LightingMode, PostProcessMode};
use multipass_platform::{InputState, KeyCode, MouseButton};
use multipass_renderer::FrameScene;
use multipass_scene::camera::MOVE_SPEED;
use multipass_scene::{Camera, DirectionalLight, EulerRotation, Movement};

/// Distance the light moves per frame while a key is held.
pub const LIGHT_STEP: f32 = MOVE_SPEED / 2.0;

const MOVEMENT_KEYS: [(KeyCode, Movement); 4] = [
    (KeyCode::KeyW, Movement::Forward),
    (KeyCode::KeyS, Movement::Backward),
    (KeyCode::KeyA, Movement::Left),
    (KeyCode::KeyD, Movement::Right),
];

// One light direction per frame, first held key wins.
const LIGHT_KEYS: [(KeyCode, Vec3); 6] = [
    (KeyCode::ArrowLeft, Vec3::NEG_X),
    (KeyCode::ArrowRight, Vec3::X),
    (KeyCode::ArrowUp, Vec3::NEG_Z),
    (KeyCode::ArrowDown, Vec3::Z),
    (KeyCode::KeyO, Vec3::Y),
    (KeyCode::KeyL, Vec3::NEG_Y),
];

const LIGHTING_KEYS: [(KeyCode, LightingMode); 3] = [
    (KeyCode::Digit1, LightingMode::Unlit),
    (KeyCode::Digit2, LightingMode::Flat),
    (KeyCode::Digit3, LightingMode::Shadowed),
];

const POST_PROCESS_KEYS: [(KeyCode, PostProcessMode); 5] = [
    (KeyCode::Digit0, PostProcessMode::None),
    (KeyCode::F1, PostProcessMode::Laplace),
    (KeyCode::F2, PostProcessMode::Blur),
    (KeyCode::F3, PostProcessMode::Sepia),
    (KeyCode::F4, PostProcessMode::Fxaa),
];

/// Renderer settings changed by a key press.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Action {
    Lighting(LightingMode),
    PostProcess(PostProcessMode),
    ToggleMsaaInput,
}

/// Camera, light and cube rotation.
#[derive(Clone, Debug)]
pub struct SceneState {
    pub camera: Camera,
    pub light: DirectionalLight,
    pub rotation: EulerRotation,
}

impl SceneState {
    pub fn new(aspect: f32) -> Self {
        Self {
            camera: Camera::new(aspect),
            light: DirectionalLight::default(),
            rotation: EulerRotation::default(),
        }
    }

    /// Moves the camera and the light for held keys and drags, and returns
    /// the renderer actions of keys pressed this frame.
    pub fn apply_input(&mut self, input: &InputState) -> Vec<Action> {
        for (key, movement) in MOVEMENT_KEYS {
            if input.is_key_pressed(key) {
                self.camera.step(movement);
            }
        }
        if let Some((dx, dy)) = input.drag_delta(MouseButton::Left) {
            self.camera.rotate(dx, dy);
        }
        if let Some((_, direction)) = LIGHT_KEYS.iter().find(|(key, _)| input.is_key_pressed(*key)) {
            self.light.translate(*direction * LIGHT_STEP);
        }
        if input.is_key_just_pressed(KeyCode::KeyR) {
            self.rotation.toggle_auto_rotate();
        }

        let lighting = LIGHTING_KEYS
            .iter()
            .filter(|(key, _)| input.is_key_just_pressed(*key))
            .map(|(_, mode)| Action::Lighting(*mode));
        let post_process = POST_PROCESS_KEYS
            .iter()
            .filter(|(key, _)| input.is_key_just_pressed(*key))
            .map(|(_, mode)| Action::PostProcess(*mode));
        let msaa = input
            .is_key_just_pressed(KeyCode::KeyM)
            .then_some(Action::ToggleMsaaInput);
        lighting.chain(post_process).chain(msaa).collect()
    }

    /// Advances the animation by one frame.
    pub fn advance(&mut self) {
        self.rotation.advance();
    }

    pub fn frame_scene(&self) -> FrameScene {
        FrameScene::new(&self.camera, &self.light, &self.rotation)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pressed(keys: &[KeyCode]) -> InputState {
        let mut input = InputState::new();
        for key in keys {
            input.on_key_pressed(*key);
        }
        input
    }

    #[test]
    fn test_forward_moves_camera_towards_origin() {
        let mut scene = SceneState::new(1.0);
        let start = scene.camera.position;
        scene.apply_input(&pressed(&[KeyCode::KeyW]));
        assert!(((scene.camera.position - start).length() - MOVE_SPEED).abs() < 1e-5);
        assert!(scene.camera.position.z < start.z);
    }

    #[test]
    fn test_light_moves_one_axis_per_frame() {
        let mut scene = SceneState::new(1.0);
        let start = scene.light.position;
        scene.apply_input(&pressed(&[KeyCode::ArrowRight, KeyCode::KeyO]));
        assert_eq!(scene.light.position, start + Vec3::X * LIGHT_STEP);
    }

    #[test]
    fn test_mode_keys() {
        let mut scene = SceneState::new(1.0);
        let actions = scene.apply_input(&pressed(&[KeyCode::Digit2, KeyCode::F3, KeyCode::KeyM]));
        assert_eq!(
            actions,
            [
                Action::Lighting(LightingMode::Flat),
                Action::PostProcess(PostProcessMode::Sepia),
                Action::ToggleMsaaInput,
            ]
        );
    }

    #[test]
    fn test_held_keys_do_not_repeat_actions() {
        let mut scene = SceneState::new(1.0);
        let mut input = pressed(&[KeyCode::KeyR, KeyCode::Digit1]);
        assert_eq!(scene.apply_input(&input).len(), 1);
        assert!(scene.rotation.auto_rotate());

        input.begin_frame();
        assert!(scene.apply_input(&input).is_empty());
        assert!(scene.rotation.auto_rotate());
    }

    #[test]
    fn test_advance_only_with_auto_rotation() {
        let mut scene = SceneState::new(1.0);
        scene.advance();
        assert_eq!(scene.rotation, EulerRotation::default());

        scene.rotation.toggle_auto_rotate();
        scene.advance();
        assert_eq!((scene.rotation.x, scene.rotation.y, scene.rotation.z), (21, 11, 31));
    }
}
