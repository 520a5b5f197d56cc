//! Avatar camera — world position, heading, keyboard movement, pointer look.
//!
//! World space is right-handed with +Y up and the avatar initially facing
//! +Z.  GL eye space faces -Z, so the world-to-eye transform always
//! contains a half turn about Y.

use std::f32::consts::{FRAC_PI_2, PI};

use glam::{Mat4, Vec3};

use crate::input::Direction;

/// Default walking speed in scene units per second.
pub const DEFAULT_MOVE_SPEED: f32 = 2.0;

const MAX_PITCH: f32 = FRAC_PI_2 * 0.95;

#[derive(Debug, Clone)]
pub struct Camera {
    /// Avatar anchor in world space, moved by the keyboard.
    pub position: Vec3,
    /// Tracked head displacement; the eye sits at `position - head_offset`.
    pub head_offset: Vec3,
    /// Heading in radians, positive turns left.
    pub yaw: f32,
    /// Elevation in radians, positive looks up.  Only used without an HMD.
    pub pitch: f32,
    pub move_speed: f32,
    held: [bool; 4],
}

impl Default for Camera {
    fn default() -> Self {
        Self::new(DEFAULT_MOVE_SPEED)
    }
}

impl Camera {
    pub fn new(move_speed: f32) -> Self {
        Self {
            position: Vec3::ZERO,
            head_offset: Vec3::ZERO,
            yaw: 0.0,
            pitch: 0.0,
            move_speed,
            held: [false; 4],
        }
    }

    /// World position of the eyes' midpoint.
    pub fn eye_position(&self) -> Vec3 {
        self.position - self.head_offset
    }

    pub fn set_held(&mut self, direction: Direction, pressed: bool) {
        self.held[direction.index()] = pressed;
    }

    pub fn is_held(&self, direction: Direction) -> bool {
        self.held[direction.index()]
    }

    /// Horizontal unit vector along the current heading.
    pub fn forward(&self) -> Vec3 {
        Vec3::new(self.yaw.sin(), 0.0, self.yaw.cos())
    }

    /// Horizontal unit vector to the avatar's right.
    pub fn right(&self) -> Vec3 {
        self.forward().cross(Vec3::Y)
    }

    /// Advance the anchor by `dt` seconds of held movement keys.
    pub fn update(&mut self, dt: f32) {
        let mut step = Vec3::ZERO;
        for direction in Direction::ALL {
            if !self.is_held(direction) {
                continue;
            }
            step += match direction {
                Direction::Forward => self.forward(),
                Direction::Back => -self.forward(),
                Direction::Left => -self.right(),
                Direction::Right => self.right(),
            };
        }
        if let Some(dir) = step.try_normalize() {
            self.position += dir * self.move_speed * dt;
        }
    }

    /// Pointer look: the horizontal position spans a half turn, the
    /// vertical position a quarter turn.
    pub fn look_at_pointer(&mut self, x: f64, y: f64, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        let nx = (x / width as f64).clamp(0.0, 1.0) as f32;
        let ny = (y / height as f64).clamp(0.0, 1.0) as f32;
        self.yaw = (0.5 - nx) * PI;
        self.pitch = ((0.5 - ny) * FRAC_PI_2).clamp(-MAX_PITCH, MAX_PITCH);
    }

    /// World → head-centered eye space.  `look` applies the camera's own
    /// yaw and pitch; it is off when an HMD view already carries the head
    /// rotation.
    pub fn world_view(&self, look: bool) -> Mat4 {
        let flip = Mat4::from_rotation_y(PI);
        let translate = Mat4::from_translation(-self.eye_position());
        if look {
            flip * Mat4::from_rotation_x(self.pitch) * Mat4::from_rotation_y(-self.yaw) * translate
        } else {
            flip * translate
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: Vec3, b: Vec3) -> bool {
        (a - b).abs().max_element() < 0.001
    }

    #[test]
    fn test_starts_facing_default_window() {
        let cam = Camera::default();
        let p = cam.world_view(true).transform_point3(Vec3::new(0.0, 0.0, 5.0));
        assert!(approx(p, Vec3::new(0.0, 0.0, -5.0)), "got {:?}", p);
    }

    #[test]
    fn test_yaw_turns_view() {
        let mut cam = Camera::default();
        cam.yaw = FRAC_PI_2;
        assert!(approx(cam.forward(), Vec3::X));
        let p = cam.world_view(true).transform_point3(Vec3::new(5.0, 0.0, 0.0));
        assert!(approx(p, Vec3::new(0.0, 0.0, -5.0)), "got {:?}", p);
    }

    #[test]
    fn test_pitch_looks_up() {
        let mut cam = Camera::default();
        cam.pitch = 0.3;
        let target = Vec3::new(0.0, 5.0 * 0.3f32.sin(), 5.0 * 0.3f32.cos());
        let p = cam.world_view(true).transform_point3(target);
        assert!(approx(p, Vec3::new(0.0, 0.0, -5.0)), "got {:?}", p);
    }

    #[test]
    fn test_hmd_view_ignores_look() {
        let mut cam = Camera::default();
        cam.yaw = 1.0;
        cam.pitch = 0.5;
        let p = cam.world_view(false).transform_point3(Vec3::new(0.0, 0.0, 5.0));
        assert!(approx(p, Vec3::new(0.0, 0.0, -5.0)));
    }

    #[test]
    fn test_translation_uses_eye_position() {
        let mut cam = Camera::default();
        cam.position = Vec3::new(1.0, 0.0, 0.0);
        cam.head_offset = Vec3::new(0.0, -0.5, 0.0);
        assert!(approx(cam.eye_position(), Vec3::new(1.0, 0.5, 0.0)));
        let p = cam.world_view(false).transform_point3(cam.eye_position());
        assert!(approx(p, Vec3::ZERO));
    }

    #[test]
    fn test_forward_movement_along_yaw() {
        let mut cam = Camera::new(2.0);
        cam.yaw = FRAC_PI_2;
        cam.set_held(Direction::Forward, true);
        cam.update(0.5);
        assert!(approx(cam.position, Vec3::new(1.0, 0.0, 0.0)), "got {:?}", cam.position);
    }

    #[test]
    fn test_strafe_and_opposing_keys() {
        let mut cam = Camera::new(1.0);
        cam.set_held(Direction::Right, true);
        cam.update(1.0);
        assert!(approx(cam.position, Vec3::new(-1.0, 0.0, 0.0)), "got {:?}", cam.position);

        cam.set_held(Direction::Left, true);
        cam.update(1.0);
        assert!(approx(cam.position, Vec3::new(-1.0, 0.0, 0.0)));
    }

    #[test]
    fn test_diagonal_is_normalized() {
        let mut cam = Camera::new(1.0);
        cam.set_held(Direction::Forward, true);
        cam.set_held(Direction::Left, true);
        cam.update(1.0);
        assert!((cam.position.length() - 1.0).abs() < 0.001);
        assert_eq!(cam.position.y, 0.0);
    }

    #[test]
    fn test_pointer_look() {
        let mut cam = Camera::default();
        cam.look_at_pointer(640.0, 400.0, 1280, 800);
        assert!(cam.yaw.abs() < 0.001 && cam.pitch.abs() < 0.001);

        cam.look_at_pointer(1280.0, 0.0, 1280, 800);
        assert!((cam.yaw + FRAC_PI_2).abs() < 0.001);
        assert!(cam.pitch > 0.0 && cam.pitch <= MAX_PITCH);

        cam.look_at_pointer(10.0, 10.0, 0, 0);
        assert!((cam.yaw + FRAC_PI_2).abs() < 0.001);
    }
}
