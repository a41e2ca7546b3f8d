//! Constant-velocity motion model for one tracked box
//!
//! State vector: [cx, cy, w, h, vx, vy, vw, vh]. The covariance is kept
//! diagonal, which reduces the Kalman update to eight scalar gains.
//! That is enough to bridge brief detector misses between cycles.

/// Scalar-gain Kalman filter over box center, size, and their velocities.
#[derive(Debug, Clone)]
pub struct KalmanBox {
    /// State estimate: [cx, cy, w, h, vx, vy, vw, vh]
    state: [f32; 8],
    /// Diagonal estimate-error covariance.
    p: [f32; 8],
    /// Process noise (motion uncertainty).
    q: f32,
    /// Observation noise (measurement uncertainty).
    r: f32,
}

/// Velocity components get a larger effective observation noise: they
/// are never observed directly, only inferred from position residuals.
const VELOCITY_NOISE_SCALE: f32 = 10.0;

impl KalmanBox {
    /// Initialize from a first observed box, with zero velocity.
    pub fn new(bbox: [f32; 4]) -> Self {
        let (cx, cy, w, h) = to_center(bbox);
        Self {
            state: [cx, cy, w, h, 0.0, 0.0, 0.0, 0.0],
            p: [10.0; 8],
            q: 0.5,
            r: 4.0,
        }
    }

    /// Advance the state one cycle under the constant-velocity model,
    /// without incorporating any detection.
    pub fn predict(&mut self) {
        self.state[0] += self.state[4];
        self.state[1] += self.state[5];
        self.state[2] += self.state[6];
        self.state[3] += self.state[7];

        for p in &mut self.p {
            *p += self.q;
        }
    }

    /// Correct the state toward an observed box.
    pub fn update(&mut self, bbox: [f32; 4]) {
        let (cx, cy, w, h) = to_center(bbox);
        let residual = [
            cx - self.state[0],
            cy - self.state[1],
            w - self.state[2],
            h - self.state[3],
        ];

        for i in 0..4 {
            let k_pos = self.p[i] / (self.p[i] + self.r);
            self.state[i] += k_pos * residual[i];
            self.p[i] *= 1.0 - k_pos;

            let vi = i + 4;
            let k_vel = self.p[vi] / (self.p[vi] + self.r * VELOCITY_NOISE_SCALE);
            self.state[vi] += k_vel * residual[i];
            self.p[vi] *= 1.0 - k_vel;
        }
    }

    /// Current state as an (x1, y1, x2, y2) box.
    pub fn bbox(&self) -> [f32; 4] {
        let cx = self.state[0];
        let cy = self.state[1];
        let w = self.state[2].max(1.0);
        let h = self.state[3].max(1.0);
        [cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0]
    }

    /// Estimated (vx, vy) of the box center.
    pub fn velocity(&self) -> (f32, f32) {
        (self.state[4], self.state[5])
    }
}

fn to_center(bbox: [f32; 4]) -> (f32, f32, f32, f32) {
    (
        (bbox[0] + bbox[2]) / 2.0,
        (bbox[1] + bbox[3]) / 2.0,
        bbox[2] - bbox[0],
        bbox[3] - bbox[1],
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predict_without_updates_holds_position() {
        let mut kf = KalmanBox::new([10.0, 10.0, 30.0, 30.0]);
        kf.predict();
        // Initial velocity is zero: prediction stays put.
        let b = kf.bbox();
        assert!((b[0] - 10.0).abs() < 0.01);
        assert!((b[3] - 30.0).abs() < 0.01);
    }

    #[test]
    fn repeated_updates_learn_velocity() {
        let mut kf = KalmanBox::new([0.0, 0.0, 20.0, 20.0]);
        // Object moving +5 px/cycle in x.
        for i in 1..20 {
            kf.predict();
            let x = 5.0 * i as f32;
            kf.update([x, 0.0, x + 20.0, 20.0]);
        }
        let (vx, vy) = kf.velocity();
        assert!(vx > 2.0, "vx should trend toward 5, got {vx}");
        assert!(vy.abs() < 0.5);

        // The next prediction should carry the box forward, not leave it
        // at the last observation.
        let before = kf.bbox()[0];
        kf.predict();
        assert!(kf.bbox()[0] > before);
    }

    #[test]
    fn update_pulls_state_toward_observation() {
        let mut kf = KalmanBox::new([0.0, 0.0, 10.0, 10.0]);
        kf.predict();
        kf.update([4.0, 4.0, 14.0, 14.0]);
        let b = kf.bbox();
        assert!(b[0] > 0.0 && b[0] < 4.0);
    }
}
