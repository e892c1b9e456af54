// Encoding Model
// Per-destination video/audio encoding parameters and templates

use serde::{Deserialize, Serialize};

use super::{Orientation, Service};

fn default_width() -> u32 {
    1920
}

fn default_height() -> u32 {
    1080
}

fn default_fps_num() -> u32 {
    30
}

fn default_fps_den() -> u32 {
    1
}

fn default_video_bitrate() -> u32 {
    4500
}

fn default_audio_bitrate() -> u32 {
    160
}

fn default_preset() -> Option<String> {
    Some("veryfast".to_string())
}

fn default_profile() -> Option<String> {
    Some("main".to_string())
}

pub const MAX_DIMENSION: u32 = 8192;
pub const MAX_FPS: u32 = 240;
pub const MAX_VIDEO_BITRATE: u32 = 200_000;
pub const MAX_AUDIO_BITRATE: u32 = 1024;

/// Encoding parameters for one destination
///
/// Bitrates are in kbps. A destination whose encoding equals the source
/// may still be passed through without re-encoding by the engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodingSettings {
    #[serde(default = "default_width")]
    pub width: u32,

    #[serde(default = "default_height")]
    pub height: u32,

    #[serde(default = "default_fps_num")]
    pub fps_num: u32,

    #[serde(default = "default_fps_den")]
    pub fps_den: u32,

    #[serde(default = "default_video_bitrate")]
    pub video_bitrate: u32,

    #[serde(default = "default_audio_bitrate")]
    pub audio_bitrate: u32,

    /// Encoder preset, e.g. "veryfast"
    #[serde(default = "default_preset")]
    pub preset: Option<String>,

    /// Encoder profile, e.g. "main" or "high"
    #[serde(default = "default_profile")]
    pub profile: Option<String>,
}

impl Default for EncodingSettings {
    fn default() -> Self {
        Self {
            width: default_width(),
            height: default_height(),
            fps_num: default_fps_num(),
            fps_den: default_fps_den(),
            video_bitrate: default_video_bitrate(),
            audio_bitrate: default_audio_bitrate(),
            preset: default_preset(),
            profile: default_profile(),
        }
    }
}

impl EncodingSettings {
    pub fn new(width: u32, height: u32, fps: u32, video_bitrate: u32) -> Self {
        Self {
            width,
            height,
            fps_num: fps,
            video_bitrate,
            ..Self::default()
        }
    }

    pub fn with_audio_bitrate(mut self, audio_bitrate: u32) -> Self {
        self.audio_bitrate = audio_bitrate;
        self
    }

    /// Reject settings the engine could never encode
    pub fn validate(&self) -> Result<(), String> {
        if self.width == 0 || self.height == 0 {
            return Err(format!(
                "Invalid resolution {}x{}: dimensions must be non-zero",
                self.width, self.height
            ));
        }
        if self.fps_num == 0 || self.fps_den == 0 {
            return Err(format!(
                "Invalid frame rate {}/{}",
                self.fps_num, self.fps_den
            ));
        }
        if self.width > MAX_DIMENSION || self.height > MAX_DIMENSION {
            return Err(format!(
                "Invalid resolution {}x{}: dimensions are limited to {MAX_DIMENSION}",
                self.width, self.height
            ));
        }
        if self.fps() > MAX_FPS as f64 {
            return Err(format!(
                "Invalid frame rate {}/{}: at most {MAX_FPS} fps",
                self.fps_num, self.fps_den
            ));
        }
        if self.video_bitrate == 0 {
            return Err("Video bitrate must be non-zero".to_string());
        }
        if self.video_bitrate > MAX_VIDEO_BITRATE {
            return Err(format!(
                "Video bitrate {} kbps exceeds {MAX_VIDEO_BITRATE} kbps",
                self.video_bitrate
            ));
        }
        if self.audio_bitrate > MAX_AUDIO_BITRATE {
            return Err(format!(
                "Audio bitrate {} kbps exceeds {MAX_AUDIO_BITRATE} kbps",
                self.audio_bitrate
            ));
        }
        Ok(())
    }

    /// Frame rate as a float, for display and logging
    pub fn fps(&self) -> f64 {
        if self.fps_den == 0 {
            return 0.0;
        }
        self.fps_num as f64 / self.fps_den as f64
    }

    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }

    /// Parameters in the shape the engine expects for a live update
    pub fn to_params(&self) -> EncodingParams {
        EncodingParams {
            video_bitrate: self.video_bitrate,
            audio_bitrate: self.audio_bitrate,
            width: self.width,
            height: self.height,
            fps_num: self.fps_num,
            fps_den: self.fps_den,
            preset: self.preset.clone(),
            profile: self.profile.clone(),
        }
    }
}

/// Live encoding change for a single process output
///
/// Zero or `None` fields are left untouched by the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodingParams {
    pub video_bitrate: u32,
    pub audio_bitrate: u32,
    pub width: u32,
    pub height: u32,
    pub fps_num: u32,
    pub fps_den: u32,
    pub preset: Option<String>,
    pub profile: Option<String>,
}

/// A named, reusable encoding preset
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DestinationTemplate {
    pub id: String,
    pub name: String,

    /// Platform the preset targets (Custom for generic presets)
    #[serde(default)]
    pub service: Service,

    #[serde(default)]
    pub orientation: Orientation,

    pub encoding: EncodingSettings,

    #[serde(default)]
    pub builtin: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_encoding_is_valid() {
        assert!(EncodingSettings::default().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let mut enc = EncodingSettings::default();
        enc.width = 0;
        assert!(enc.validate().is_err());

        let mut enc = EncodingSettings::default();
        enc.fps_den = 0;
        assert!(enc.validate().is_err());

        let mut enc = EncodingSettings::default();
        enc.video_bitrate = 0;
        assert!(enc.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_values_past_limits() {
        assert!(matches!(
            EncodingSettings::new(1920, 1080, 30, u32::MAX).validate(),
            Err(msg) if msg.contains("200000")
        ));
        assert!(EncodingSettings::new(1920, 1080, 30, MAX_VIDEO_BITRATE).validate().is_ok());
        assert!(EncodingSettings::new(u32::MAX, 1080, 30, 6000).validate().is_err());
        assert!(EncodingSettings::new(1920, 1080, 1000, 6000).validate().is_err());
        assert!(EncodingSettings::default().with_audio_bitrate(u32::MAX).validate().is_err());
    }

    #[test]
    fn test_fps() {
        let mut enc = EncodingSettings::new(1920, 1080, 30000, 6000);
        enc.fps_den = 1001;
        assert!((enc.fps() - 29.97).abs() < 0.01);
    }
}
