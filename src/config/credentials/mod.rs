use super::schema::Config;

macro_rules! define_credentials {
    ($( $name:literal, $env:literal => $($path:ident).+ );* $(;)?) => {
        /// (slot name, env var name) pairs.
        pub const CREDENTIAL_ENV_VARS: &[(&str, &str)] = &[$(($name, $env)),*];

        /// Get the current value of a credential field by slot name.
        pub fn get_credential_value<'a>(config: &'a Config, name: &str) -> Option<&'a str> {
            match name {
                $($name => Some(config.$($path).+.as_str()),)*
                _ => None,
            }
        }

        /// Apply environment variable overrides.
        ///
        /// Any `BIZBOT_*` env var that is set and non-empty overwrites the
        /// corresponding config field.
        pub fn apply_env_overrides(config: &mut Config) {
            $(
                if let Ok(val) = std::env::var($env) {
                    if !val.is_empty() {
                        config.$($path).+ = val;
                    }
                }
            )*
        }
    };
}

define_credentials! {
    // AI vendors
    "ai-provider",                "BIZBOT_AI_PROVIDER"                => ai.provider;
    "openai-api-key",             "BIZBOT_OPENAI_API_KEY"             => ai.openai.api_key;
    "groq-api-key",               "BIZBOT_GROQ_API_KEY"               => ai.groq.api_key;
    // WhatsApp Cloud API
    "whatsapp-verify-token",      "BIZBOT_WHATSAPP_VERIFY_TOKEN"      => whatsapp.verify_token;
    "whatsapp-app-secret",        "BIZBOT_WHATSAPP_APP_SECRET"        => whatsapp.app_secret;
    "whatsapp-phone-number-id",   "BIZBOT_WHATSAPP_PHONE_NUMBER_ID"   => whatsapp.phone_number_id;
    // Storage
    "database-path",              "BIZBOT_DATABASE_PATH"              => database.path;
}

/// Slot names and whether each one currently holds a value.
pub fn credential_status(config: &Config) -> Vec<(&'static str, bool)> {
    CREDENTIAL_ENV_VARS
        .iter()
        .map(|(name, _)| {
            let set = get_credential_value(config, name).is_some_and(|v| !v.is_empty());
            (*name, set)
        })
        .collect()
}
