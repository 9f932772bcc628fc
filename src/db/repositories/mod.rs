mod posture_samples;
mod sessions;
