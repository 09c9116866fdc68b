//! The eye the world is seen through.
//!
//! `Camera` is the view half, `Projection` the perspective half. Their product,
//! `view_projection`, drives both chunk visibility and the `CameraUniform` the
//! GPU layer receives.

use cgmath::*;
use std::f32::consts::FRAC_PI_2;

/// Maps OpenGL clip space onto the `[0, 1]` depth range of modern GPU APIs.
///
/// NDC range from -1 to 1 in X and Y, and 0 to 1 in Z. This matrix scales Z
/// from [-1, 1] to [-0.5, 0.5] and then translates it to [0, 1].
#[rustfmt::skip]
pub const OPENGL_TO_WGPU_MATRIX: cgmath::Matrix4<f32> = cgmath::Matrix4::new(
    1.0, 0.0, 0.0, 0.0,
    0.0, 1.0, 0.0, 0.0,
    0.0, 0.0, 0.5, 0.0,
    0.0, 0.0, 0.5, 1.0,
);

/// Pitch stays short of straight up or down so the view basis never degenerates.
const SAFE_FRAC_PI_2: f32 = FRAC_PI_2 - 0.0001;

/// A free-flying camera in world space.
///
/// Every change of position or orientation goes through a method that bumps
/// `eye_change_id`, so consumers can tell whether the view changed since they last
/// looked without comparing matrices.
#[derive(Debug, Clone)]
pub struct Camera {
    position: Point3<f32>,
    yaw: Rad<f32>,
    pitch: Rad<f32>,
    eye_change_id: u64,
}

impl Camera {
    /// Creates a new camera with the specified position and orientation.
    ///
    /// # Arguments
    /// * `position` - Initial position of the camera in world space
    /// * `yaw` - Horizontal rotation around Y; zero looks along +X
    /// * `pitch` - Vertical rotation; clamped just short of straight up or down
    ///
    /// # Example
    /// ```rust
    /// use cgmath::{Deg, Point3};
    /// use chunk_mesh_engine::engine_state::camera_state::camera::Camera;
    ///
    /// let camera = Camera::new(Point3::new(0.0, 40.0, 0.0), Deg(45.0), Deg(-30.0));
    /// assert_eq!(camera.eye_change_id(), 0);
    /// ```
    pub fn new<V: Into<Point3<f32>>, Y: Into<Rad<f32>>, P: Into<Rad<f32>>>(
        position: V,
        yaw: Y,
        pitch: P,
    ) -> Self {
        Self {
            position: position.into(),
            yaw: yaw.into(),
            pitch: clamp_pitch(pitch.into()),
            eye_change_id: 0,
        }
    }

    pub fn position(&self) -> Point3<f32> {
        self.position
    }

    pub fn yaw(&self) -> Rad<f32> {
        self.yaw
    }

    pub fn pitch(&self) -> Rad<f32> {
        self.pitch
    }

    /// Counter bumped on every move or rotation.
    pub fn eye_change_id(&self) -> u64 {
        self.eye_change_id
    }

    /// Normalized direction the camera is facing.
    pub fn forward(&self) -> Vector3<f32> {
        let (yaw_sin, yaw_cos) = self.yaw.0.sin_cos();
        let (pitch_sin, pitch_cos) = self.pitch.0.sin_cos();
        Vector3::new(pitch_cos * yaw_cos, pitch_sin, pitch_cos * yaw_sin).normalize()
    }

    /// Moves the camera to an absolute position.
    pub fn set_position<V: Into<Point3<f32>>>(&mut self, position: V) {
        self.position = position.into();
        self.eye_change_id += 1;
    }

    /// Moves the camera by a world-space offset.
    pub fn translate(&mut self, offset: Vector3<f32>) {
        self.position += offset;
        self.eye_change_id += 1;
    }

    /// Rotates the camera by the given yaw and pitch deltas.
    pub fn rotate<Y: Into<Rad<f32>>, P: Into<Rad<f32>>>(&mut self, yaw_delta: Y, pitch_delta: P) {
        self.yaw += yaw_delta.into();
        self.pitch = clamp_pitch(self.pitch + pitch_delta.into());
        self.eye_change_id += 1;
    }

    /// Turns the camera toward a world-space point.
    pub fn look_at(&mut self, target: Point3<f32>) {
        let direction = target - self.position;
        let horizontal = (direction.x * direction.x + direction.z * direction.z).sqrt();
        self.yaw = Rad(direction.z.atan2(direction.x));
        self.pitch = clamp_pitch(Rad(direction.y.atan2(horizontal)));
        self.eye_change_id += 1;
    }

    /// World-to-view matrix.
    pub fn calc_matrix(&self) -> Matrix4<f32> {
        Matrix4::look_to_rh(self.position, self.forward(), Vector3::unit_y())
    }
}

fn clamp_pitch(pitch: Rad<f32>) -> Rad<f32> {
    Rad(pitch.0.clamp(-SAFE_FRAC_PI_2, SAFE_FRAC_PI_2))
}

/// Perspective parameters of the viewport.
#[derive(Debug, Clone)]
pub struct Projection {
    aspect: f32,
    fovy: Rad<f32>,
    znear: f32,
    zfar: f32,
}

impl Projection {
    /// A projection for a `width`×`height` viewport. A zero height is treated as one.
    pub fn new<F: Into<Rad<f32>>>(width: u32, height: u32, fovy: F, znear: f32, zfar: f32) -> Self {
        Self {
            aspect: width as f32 / height.max(1) as f32,
            fovy: fovy.into(),
            znear,
            zfar,
        }
    }

    /// Recomputes the aspect ratio for a new viewport size.
    pub fn resize(&mut self, width: u32, height: u32) {
        self.aspect = width as f32 / height.max(1) as f32;
    }

    /// View-to-clip matrix, with depth mapped to `[0, 1]`.
    pub fn calc_matrix(&self) -> Matrix4<f32> {
        OPENGL_TO_WGPU_MATRIX * perspective(self.fovy, self.aspect, self.znear, self.zfar)
    }
}

/// Combined projection×view matrix, the input of chunk visibility.
pub fn view_projection(camera: &Camera, projection: &Projection) -> Matrix4<f32> {
    projection.calc_matrix() * camera.calc_matrix()
}

/// Camera data as the terrain shader reads it.
#[repr(C)]
#[derive(Debug, Copy, Clone, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct CameraUniform {
    // cgmath types are not Pod, so matrices are stored as plain arrays
    view_proj: [[f32; 4]; 4],
    view_proj_inverse: [[f32; 4]; 4],
    position: [f32; 4],
}

impl CameraUniform {
    /// Packs the current camera state.
    pub fn new(camera: &Camera, projection: &Projection) -> Self {
        let view_proj = view_projection(camera, projection);
        let inverse = view_proj.invert().unwrap_or_else(Matrix4::identity);
        let position = camera.position();
        Self {
            view_proj: view_proj.into(),
            view_proj_inverse: inverse.into(),
            position: [position.x, position.y, position.z, 0.0],
        }
    }
}
