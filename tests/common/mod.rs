#![allow(dead_code)]

use std::collections::HashMap;

use dogmap_rt::AppConfig;
use wiremock::MockServer;

pub const OPENAI_KEY: &str = "sk-test-secret";
pub const GOOGLE_KEY: &str = "g-test-secret";

pub const PLACES_PATH: &str = "/maps/api/place/textsearch/json";
pub const GEOCODE_PATH: &str = "/maps/api/geocode/json";
pub const SESSIONS_PATH: &str = "/v1/realtime/sessions";

/// Configuration with every upstream pointed at `server`.
pub fn config_for(server: &MockServer) -> AppConfig {
    let uri = server.uri();
    let vars: HashMap<&str, String> = HashMap::from([
        ("OPENAI_API_KEY", OPENAI_KEY.to_string()),
        ("GOOGLE_PLACES_API_KEY", GOOGLE_KEY.to_string()),
        ("OPENAI_BASE_URL", format!("{uri}/v1/realtime")),
        ("PLACES_BASE_URL", format!("{uri}{PLACES_PATH}")),
        ("GEOCODE_BASE_URL", format!("{uri}{GEOCODE_PATH}")),
        ("IP_GEO_BASE_URL", format!("{uri}/json")),
    ]);
    AppConfig::from_lookup(|key| vars.get(key).cloned()).unwrap()
}

pub fn places_ok() -> serde_json::Value {
    serde_json::json!({
        "status": "OK",
        "results": [
            { "name": "Bark Park", "formatted_address": "Tiergarten, Berlin", "rating": 4.7 },
            { "name": "Cafe Pfote", "formatted_address": "Mitte, Berlin" }
        ]
    })
}

pub fn session_ok() -> serde_json::Value {
    serde_json::json!({
        "id": "sess_1",
        "object": "realtime.session",
        "client_secret": { "value": "ek_test", "expires_at": 1_735_000_000 }
    })
}
