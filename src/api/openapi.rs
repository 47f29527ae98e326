//! OpenAPI documentation and schema generation
//!
//! The spec is generated at compile time by utoipa.

use utoipa::OpenApi;

/// OpenAPI documentation for the catalog-mirror REST API
///
/// The spec can be accessed via:
/// - `/api/v1/openapi.json` - JSON format OpenAPI specification
/// - `/swagger-ui` - Interactive Swagger UI documentation
#[derive(OpenApi)]
#[openapi(
    info(
        title = "catalog-mirror REST API",
        version = "0.1.0",
        description = "OpenAPI 3.1 compliant REST API for mirroring a remote content catalog, polling it for changes and verifying the local store",
        license(
            name = "MIT OR Apache-2.0"
        )
    ),
    servers(
        (url = "http://localhost:8000/api/v1", description = "Local development server")
    ),
    paths(
        // Mirror
        crate::api::routes::watch,
        crate::api::routes::crawl_run,
        crate::api::routes::crawl_item,
        crate::api::routes::verify,

        // Monitor
        crate::api::routes::monitor_status,
        crate::api::routes::monitor_start,
        crate::api::routes::monitor_stop,
        crate::api::routes::monitor_interval,

        // System
        crate::api::routes::health_check,
        crate::api::routes::openapi_spec,
        crate::api::routes::event_stream,
    ),
    components(schemas(
        // Core types from types.rs
        crate::types::ContentKind,
        crate::types::ContentItem,
        crate::types::Stage,
        crate::types::ChangeReport,
        crate::types::ListingOutcome,
        crate::types::ExpansionReport,
        crate::types::ImageOutcome,
        crate::types::ItemOutcome,
        crate::types::MaterializeReport,
        crate::types::RunReport,
        crate::types::MonitorStatus,
        crate::types::Event,

        // Verification report from verify.rs
        crate::verify::VerifyReport,
        crate::verify::ClassifyCheck,
        crate::verify::MonthsCheck,
        crate::verify::ContentCheck,
        crate::verify::ItemsCheck,
        crate::verify::ItemIssue,

        // Monitor settings
        crate::monitor::MonitorSettings,

        // API request types from routes
        crate::api::routes::StartMonitorRequest,
        crate::api::routes::IntervalRequest,

        // Error types from error.rs
        crate::error::ApiError,
        crate::error::ErrorDetail,
        crate::error::ErrorKind,
    )),
    tags(
        (name = "mirror", description = "Mirror operations - Change check, full run, single item, verification"),
        (name = "monitor", description = "Poll loop - Start, stop, interval and status"),
        (name = "system", description = "System endpoints - Health checks, OpenAPI spec, events"),
    )
)]
pub struct ApiDoc;
