use utoipa::{
    openapi::security::{Http, HttpAuthScheme, SecurityScheme},
    Modify, OpenApi,
};

use super::api::error::ErrorResponse;
use super::api::guide::PulseRequest;
use super::api::platform::{StrokeRequest, SyncRequest};

#[derive(OpenApi)]
#[openapi(
    paths(
        super::api::platform::status,
        super::api::platform::position,
        super::api::platform::start,
        super::api::platform::pause,
        super::api::platform::resume,
        super::api::platform::reset,
        super::api::platform::set_stroke,
        super::api::platform::sync,
        super::api::guide::pulse,
    ),
    components(
        schemas(
            ErrorResponse,
            StrokeRequest,
            SyncRequest,
            PulseRequest,
            crate::platform::PlatformStatus,
            crate::platform::TrackingStateKind,
            crate::geometry::SkyPosition,
            crate::guide::GuideDirection,
            crate::guide::PhysicalPulse,
            crate::guide::PhysicalCorrection,
            crate::guide::DispatchReport,
        )
    ),
    modifiers(&SecurityAddon),
    info(
        title = "Equatorial Platform Adapter API",
        description = "Control and guiding API for an equatorial platform carrying an alt-az mount",
        version = "0.1.0"
    ),
    tags(
        (name = "platform", description = "Platform tracking control"),
        (name = "guide", description = "Guide pulse translation")
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "api_key",
                SecurityScheme::Http(Http::new(HttpAuthScheme::Bearer)),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_openapi_lists_control_paths() {
        let doc = ApiDoc::openapi();
        for path in [
            "/api/platform/status",
            "/api/platform/start",
            "/api/platform/stroke",
            "/api/guide/pulse",
        ] {
            assert!(doc.paths.paths.contains_key(path), "missing {}", path);
        }
    }
}
