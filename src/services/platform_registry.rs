// Platform Registry
// Dispatch table for streaming services: names, ingest URLs, stream key handling

use crate::models::{Orientation, Service};

/// Stream key placement strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamKeyPlacement {
    /// Append stream key to URL (e.g., rtmp://server/app/{key})
    Append,
    /// Replace {stream_key} template in URL
    InUrlTemplate,
}

/// Service-specific configuration
#[derive(Debug, Clone)]
pub struct PlatformConfig {
    pub service: Service,

    /// Display name
    pub name: &'static str,

    /// Default ingest URL for horizontal and square output
    pub default_server: &'static str,

    /// Ingest URL used for vertical output, when the service has one
    pub vertical_server: Option<&'static str>,

    pub placement: StreamKeyPlacement,

    /// Orientations the service accepts
    pub orientations: &'static [Orientation],
}

const ANY_ORIENTATION: &[Orientation] = &[
    Orientation::Horizontal,
    Orientation::Vertical,
    Orientation::Square,
];

const PLATFORMS: &[PlatformConfig] = &[
    PlatformConfig {
        service: Service::Custom,
        name: "Custom",
        default_server: "",
        vertical_server: None,
        placement: StreamKeyPlacement::Append,
        orientations: ANY_ORIENTATION,
    },
    PlatformConfig {
        service: Service::Twitch,
        name: "Twitch",
        default_server: "rtmp://live.twitch.tv/app",
        vertical_server: None,
        placement: StreamKeyPlacement::Append,
        orientations: &[Orientation::Horizontal],
    },
    PlatformConfig {
        service: Service::Youtube,
        name: "YouTube",
        default_server: "rtmp://a.rtmp.youtube.com/live2",
        vertical_server: None,
        placement: StreamKeyPlacement::Append,
        orientations: ANY_ORIENTATION,
    },
    PlatformConfig {
        service: Service::Facebook,
        name: "Facebook",
        default_server: "rtmps://live-api-s.facebook.com:443/rtmp",
        vertical_server: None,
        placement: StreamKeyPlacement::Append,
        orientations: ANY_ORIENTATION,
    },
    PlatformConfig {
        service: Service::Kick,
        name: "Kick",
        default_server: "rtmp://stream.kick.com/app",
        vertical_server: None,
        placement: StreamKeyPlacement::Append,
        orientations: &[Orientation::Horizontal],
    },
    PlatformConfig {
        service: Service::Tiktok,
        name: "TikTok",
        default_server: "rtmp://live.tiktok.com/live/horizontal",
        vertical_server: Some("rtmp://live.tiktok.com/live"),
        placement: StreamKeyPlacement::Append,
        orientations: &[Orientation::Vertical, Orientation::Horizontal],
    },
    PlatformConfig {
        service: Service::Instagram,
        name: "Instagram",
        default_server: "rtmps://live-upload.instagram.com:443/rtmp",
        vertical_server: None,
        placement: StreamKeyPlacement::Append,
        orientations: &[Orientation::Vertical],
    },
    PlatformConfig {
        service: Service::XTwitter,
        name: "X (Twitter)",
        default_server: "rtmp://ingest.pscp.tv:80/x",
        vertical_server: None,
        placement: StreamKeyPlacement::Append,
        orientations: &[Orientation::Horizontal, Orientation::Vertical],
    },
];

impl PlatformConfig {
    /// Redact stream key from URL for logging
    pub fn redact_url(&self, url: &str) -> String {
        if !(url.starts_with("rtmp://") || url.starts_with("rtmps://")) {
            return url.to_string();
        }

        let base = match self.placement {
            StreamKeyPlacement::InUrlTemplate => self
                .default_server
                .split("{stream_key}")
                .next()
                .unwrap_or_default(),
            StreamKeyPlacement::Append => self.default_server,
        };

        if !base.is_empty() {
            let base = base.trim_end_matches('/');
            if let Some(rest) = url.strip_prefix(base) {
                if rest.len() > 1 {
                    return format!("{base}/***");
                }
            }
        }

        PlatformRegistry::generic_redact(url)
    }
}

/// Lookup functions over the service table
pub struct PlatformRegistry;

impl PlatformRegistry {
    /// Configuration for a service; every variant has an entry
    pub fn get(service: Service) -> &'static PlatformConfig {
        PLATFORMS
            .iter()
            .find(|config| config.service == service)
            .unwrap_or(&PLATFORMS[0])
    }

    pub fn all() -> &'static [PlatformConfig] {
        PLATFORMS
    }

    pub fn display_name(service: Service) -> &'static str {
        Self::get(service).name
    }

    /// Default ingest URL for a service and target orientation
    pub fn default_url(service: Service, orientation: Orientation) -> String {
        let config = Self::get(service);
        match (orientation, config.vertical_server) {
            (Orientation::Vertical, Some(vertical)) => vertical.to_string(),
            _ => config.default_server.to_string(),
        }
    }

    pub fn supports_orientation(service: Service, orientation: Orientation) -> bool {
        Self::get(service).orientations.contains(&orientation)
    }

    /// Build complete URL with stream key based on the service's placement strategy
    ///
    /// A destination with no base URL uses the stream key as the full URL.
    pub fn build_url_with_key(service: Service, base_url: &str, stream_key: &str) -> String {
        if base_url.is_empty() {
            return stream_key.to_string();
        }
        if stream_key.is_empty() {
            return base_url.to_string();
        }
        if base_url.contains("{stream_key}") {
            return base_url.replace("{stream_key}", stream_key);
        }
        match Self::get(service).placement {
            StreamKeyPlacement::Append => {
                format!("{}/{}", base_url.trim_end_matches('/'), stream_key)
            }
            StreamKeyPlacement::InUrlTemplate => base_url.replace("{stream_key}", stream_key),
        }
    }

    /// Redact stream key from URL
    pub fn redact_url(service: Service, url: &str) -> String {
        Self::get(service).redact_url(url)
    }

    /// Generic redaction for URLs without service context
    pub fn generic_redact(url: &str) -> String {
        if !(url.starts_with("rtmp://") || url.starts_with("rtmps://")) {
            return url.to_string();
        }

        let (scheme, rest) = match url.split_once("://") {
            Some(parts) => parts,
            None => return url.to_string(),
        };

        let (host, path) = match rest.split_once('/') {
            Some(parts) => parts,
            None => return url.to_string(),
        };

        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if segments.len() < 2 {
            return url.to_string();
        }

        let safe_path = segments[..segments.len() - 1].join("/");
        format!("{scheme}://{host}/{safe_path}/***")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_service_has_config() {
        for service in Service::ALL {
            assert_eq!(PlatformRegistry::get(service).service, service);
        }
    }

    #[test]
    fn test_display_names() {
        assert_eq!(PlatformRegistry::display_name(Service::Youtube), "YouTube");
        assert_eq!(PlatformRegistry::display_name(Service::XTwitter), "X (Twitter)");
        assert_eq!(PlatformRegistry::display_name(Service::Custom), "Custom");
    }

    #[test]
    fn test_tiktok_url_depends_on_orientation() {
        assert_eq!(
            PlatformRegistry::default_url(Service::Tiktok, Orientation::Vertical),
            "rtmp://live.tiktok.com/live"
        );
        assert_eq!(
            PlatformRegistry::default_url(Service::Tiktok, Orientation::Horizontal),
            "rtmp://live.tiktok.com/live/horizontal"
        );
    }

    #[test]
    fn test_build_url_with_key() {
        assert_eq!(
            PlatformRegistry::build_url_with_key(Service::Twitch, "rtmp://live.twitch.tv/app/", "live_abc"),
            "rtmp://live.twitch.tv/app/live_abc"
        );
        assert_eq!(
            PlatformRegistry::build_url_with_key(Service::Custom, "rtmp://host/{stream_key}/x", "k"),
            "rtmp://host/k/x"
        );
        assert_eq!(
            PlatformRegistry::build_url_with_key(Service::Custom, "", "rtmp://host/app/k"),
            "rtmp://host/app/k"
        );
    }

    #[test]
    fn test_redaction() {
        assert_eq!(
            PlatformRegistry::redact_url(Service::Youtube, "rtmp://a.rtmp.youtube.com/live2/secret-key"),
            "rtmp://a.rtmp.youtube.com/live2/***"
        );
        assert_eq!(
            PlatformRegistry::generic_redact("rtmp://custom-server.com/stream/my_key"),
            "rtmp://custom-server.com/stream/***"
        );
        assert_eq!(
            PlatformRegistry::redact_url(Service::Custom, "http://not-rtmp/x/y"),
            "http://not-rtmp/x/y"
        );
    }

    #[test]
    fn test_orientation_support() {
        assert!(PlatformRegistry::supports_orientation(Service::Instagram, Orientation::Vertical));
        assert!(!PlatformRegistry::supports_orientation(Service::Twitch, Orientation::Vertical));
    }
}
