// Template Catalog
// Built-in and user-defined encoding presets

use crate::models::{DestinationTemplate, EncodingSettings, Orientation, OutputDestination, Service};

const DEFAULT_AUDIO_BITRATE: u32 = 128;

fn builtin(
    id: &str,
    name: &str,
    service: Service,
    orientation: Orientation,
    (width, height): (u32, u32),
    fps: u32,
    video_bitrate: u32,
) -> DestinationTemplate {
    DestinationTemplate {
        id: id.to_string(),
        name: name.to_string(),
        service,
        orientation,
        encoding: EncodingSettings::new(width, height, fps, video_bitrate)
            .with_audio_bitrate(DEFAULT_AUDIO_BITRATE),
        builtin: true,
    }
}

/// The built-in preset library; same set, same order, every call
pub fn load_builtin_templates() -> Vec<DestinationTemplate> {
    use Orientation::{Horizontal, Vertical};

    vec![
        builtin("1080p60", "1080p60", Service::Custom, Horizontal, (1920, 1080), 60, 6000),
        builtin("1080p30", "1080p30", Service::Custom, Horizontal, (1920, 1080), 30, 4500),
        builtin("720p60", "720p60", Service::Custom, Horizontal, (1280, 720), 60, 4500),
        builtin("720p30", "720p30", Service::Custom, Horizontal, (1280, 720), 30, 3000),
        builtin("youtube-1080p60", "YouTube 1080p60", Service::Youtube, Horizontal, (1920, 1080), 60, 6000),
        builtin("youtube-720p60", "YouTube 720p60", Service::Youtube, Horizontal, (1280, 720), 60, 4500),
        builtin("twitch-1080p60", "Twitch 1080p60", Service::Twitch, Horizontal, (1920, 1080), 60, 6000),
        builtin("twitch-720p60", "Twitch 720p60", Service::Twitch, Horizontal, (1280, 720), 60, 4500),
        builtin("kick-1080p60", "Kick 1080p60", Service::Kick, Horizontal, (1920, 1080), 60, 6000),
        builtin("facebook-1080p", "Facebook 1080p", Service::Facebook, Horizontal, (1920, 1080), 30, 4000),
        builtin("tiktok-vertical", "TikTok Vertical", Service::Tiktok, Vertical, (1080, 1920), 30, 3000),
        builtin("instagram-vertical", "Instagram Vertical", Service::Instagram, Vertical, (1080, 1920), 30, 3500),
    ]
}

/// Overwrite a destination's encoding with the template's values
pub fn apply_template(destination: &mut OutputDestination, template: &DestinationTemplate) {
    destination.encoding = template.encoding.clone();
}

/// Read-only set of presets, loaded once
#[derive(Debug, Clone)]
pub struct TemplateCatalog {
    templates: Vec<DestinationTemplate>,
}

impl TemplateCatalog {
    /// Built-ins followed by valid custom templates; custom ids that clash with
    /// an existing template are skipped
    pub fn new(custom: &[DestinationTemplate]) -> Self {
        let mut templates = load_builtin_templates();
        for template in custom {
            if templates.iter().any(|t| t.id == template.id) {
                log::warn!("Skipping custom template '{}': id already in use", template.id);
                continue;
            }
            if let Err(e) = template.encoding.validate() {
                log::warn!("Skipping custom template '{}': {e}", template.id);
                continue;
            }
            let mut template = template.clone();
            template.builtin = false;
            templates.push(template);
        }
        Self { templates }
    }

    pub fn get(&self, id: &str) -> Option<&DestinationTemplate> {
        self.templates.iter().find(|t| t.id == id)
    }

    /// Templates targeting a service
    pub fn for_service(&self, service: Service) -> Vec<&DestinationTemplate> {
        self.templates.iter().filter(|t| t.service == service).collect()
    }

    pub fn all(&self) -> &[DestinationTemplate] {
        &self.templates
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }
}

impl Default for TemplateCatalog {
    fn default() -> Self {
        Self::new(&[])
    }
}
