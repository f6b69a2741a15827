//! OpenAPI document for the HTTP API, served as JSON with a Swagger UI.

use utoipa::openapi::security::{Http, HttpAuthScheme, SecurityScheme};
use utoipa::{Modify, OpenApi};
use utoipa_swagger_ui::SwaggerUi;

use crate::routes::{accounts, health, notifications, preferences, threads};

pub const SCHEMA_PATH: &str = "/api/schema/";
pub const SWAGGER_UI_PATH: &str = "/api/schema/swagger-ui";

#[derive(OpenApi)]
#[openapi(
    info(title = "SmartNotify API", description = "Comment notifications across in-app, email and SMS channels."),
    paths(
        health::health_check,
        accounts::register,
        accounts::login,
        accounts::refresh_token,
        preferences::get_preferences,
        preferences::update_preferences,
        threads::create_comment,
        threads::create_thread,
        threads::list_threads,
        threads::subscribe,
        notifications::unread,
        notifications::mark_read,
        notifications::history,
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Users", description = "Registration, login and token refresh"),
        (name = "Notification Preference", description = "Per-user channel switches"),
        (name = "Thread", description = "Threads and subscriptions"),
        (name = "Comment", description = "Posting comments fans out notifications"),
        (name = "Notification", description = "Inbox listings and mark-as-read"),
        (name = "Health", description = "Liveness")
    )
)]
pub struct ApiDoc;

/// Registers the `bearer_auth` scheme that protected paths refer to.
pub struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            let mut http_scheme = Http::new(HttpAuthScheme::Bearer);
            http_scheme.bearer_format = Some("JWT".to_string());
            components.add_security_scheme("bearer_auth", SecurityScheme::Http(http_scheme));
        }
    }
}

/// Swagger UI plus the raw document at `SCHEMA_PATH`.
pub fn swagger_ui() -> SwaggerUi {
    SwaggerUi::new(SWAGGER_UI_PATH).url(SCHEMA_PATH, ApiDoc::openapi())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_route_is_documented() {
        let doc = ApiDoc::openapi();
        let paths: Vec<&str> = doc.paths.paths.keys().map(String::as_str).collect();
        for path in [
            "/health",
            "/api/v1/user/register/",
            "/api/v1/user/login/",
            "/api/v1/user/token/refresh/",
            "/api/v1/notifications/notification-preferences/{user_id}/",
            "/api/v1/notifications/trigger/",
            "/api/v1/notifications/thread/create/",
            "/api/v1/notifications/thread/fetch/",
            "/api/v1/notifications/thread-subscription/create/",
            "/api/v1/notifications/notifications/unread/",
            "/api/v1/notifications/notifications/read/",
            "/api/v1/notifications/notifications/history/",
        ] {
            assert!(paths.contains(&path), "missing {}", path);
        }
    }

    #[test]
    fn test_bearer_scheme_and_schemas_registered() {
        let json = serde_json::to_value(ApiDoc::openapi()).unwrap();
        let components = &json["components"];
        assert_eq!(components["securitySchemes"]["bearer_auth"]["scheme"], "bearer");
        assert_eq!(components["securitySchemes"]["bearer_auth"]["bearerFormat"], "JWT");
        for schema in ["RegisterParams", "PreferenceView", "NotificationView", "MarkReadParams"] {
            assert!(components["schemas"].get(schema).is_some(), "missing schema {}", schema);
        }
    }

    #[test]
    fn test_protected_paths_require_bearer() {
        let json = serde_json::to_value(ApiDoc::openapi()).unwrap();
        let paths = &json["paths"];
        let unread = &paths["/api/v1/notifications/notifications/unread/"]["get"];
        assert_eq!(unread["security"][0]["bearer_auth"], serde_json::json!([]));
        let params: Vec<&str> = unread["parameters"]
            .as_array()
            .unwrap()
            .iter()
            .filter_map(|p| p["name"].as_str())
            .collect();
        assert!(params.contains(&"page"));
        assert!(params.contains(&"page_size"));

        let register = &paths["/api/v1/user/register/"]["post"];
        assert!(register.get("security").is_none());
    }
}
