use num::{Float, FromPrimitive};

// utility functions shared by the dsp and audio modules

/// one pole filter coefficient for a time constant (seconds) at a given rate
pub fn get_coef<T: Float + FromPrimitive>(val: T, rate: T) -> T {
    let one = T::from_f64(1.0).unwrap();
    one - (-one / (val * rate)).exp()
}

/// convert dB to linear gain
pub fn to_lin(v: f32) -> f32 {
    f32::powf(10.0, v / 20.0)
}

/// convert linear to dB.  Values at or below zero pin to -60.0
pub fn to_db(v: f64) -> f64 {
    if v <= 0.0 {
        return -60.0;
    }
    f64::max(20.0 * v.log10(), -60.0)
}

/// clamp a fader value into the -1.0 to 1.0 range
pub fn clip_float(v: f32) -> f32 {
    f32::clamp(v, -1.0, 1.0)
}

/// rms power of a frame in dB (with a linear gain applied first)
pub fn get_frame_power_in_db(frame: &[f32], gain: f64) -> f64 {
    if frame.is_empty() {
        return -60.0;
    }
    let mut pow: f64 = 0.0;
    for v in frame {
        pow += (*v as f64) * (*v as f64);
    }
    to_db(gain * (pow / frame.len() as f64).sqrt())
}
