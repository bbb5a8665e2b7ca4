//! Headers sent with every request.

use http::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};

use crate::config::{ClientConfig, ConfigError, SDK_VERSION};

const X_VERSION: HeaderName = HeaderName::from_static("x-version");
const X_PLATFORM: HeaderName = HeaderName::from_static("x-platform");
const X_PLATFORM_VERSION: HeaderName = HeaderName::from_static("x-platform-version");
const X_PLATFORM_FLAVOR: HeaderName = HeaderName::from_static("x-platform-flavor");
const X_PLATFORM_FLAVOR_VERSION: HeaderName =
    HeaderName::from_static("x-platform-flavor-version");
const X_CLIENT_VERSION: HeaderName = HeaderName::from_static("x-client-version");
const X_CLIENT_BUILD_VERSION: HeaderName = HeaderName::from_static("x-client-build-version");
const X_STOREKIT2_ENABLED: HeaderName = HeaderName::from_static("x-storekit2-enabled");
const X_OBSERVER_MODE_ENABLED: HeaderName = HeaderName::from_static("x-observer-mode-enabled");
const X_APPLE_DEVICE_IDENTIFIER: HeaderName =
    HeaderName::from_static("x-apple-device-identifier");

/// Builds the headers identifying this client and its platform.
pub(crate) fn default_headers(config: &ClientConfig) -> Result<HeaderMap, ConfigError> {
    let platform = &config.platform;
    let mut headers = HeaderMap::new();

    headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    headers.insert(X_VERSION, value(&X_VERSION, SDK_VERSION)?);
    headers.insert(X_PLATFORM, value(&X_PLATFORM, &platform.platform)?);
    headers.insert(
        X_PLATFORM_VERSION,
        value(&X_PLATFORM_VERSION, &platform.platform_version)?,
    );
    headers.insert(X_PLATFORM_FLAVOR, value(&X_PLATFORM_FLAVOR, &platform.flavor)?);
    headers.insert(
        X_CLIENT_VERSION,
        value(&X_CLIENT_VERSION, &platform.client_version)?,
    );
    headers.insert(
        X_CLIENT_BUILD_VERSION,
        value(&X_CLIENT_BUILD_VERSION, &platform.client_build_version)?,
    );
    headers.insert(X_STOREKIT2_ENABLED, flag(config.storekit2_enabled));
    headers.insert(X_OBSERVER_MODE_ENABLED, flag(config.observer_mode));

    if let Some(flavor_version) = &platform.flavor_version {
        headers.insert(
            X_PLATFORM_FLAVOR_VERSION,
            value(&X_PLATFORM_FLAVOR_VERSION, flavor_version)?,
        );
    }
    if let Some(device_identifier) = &platform.device_identifier {
        headers.insert(
            X_APPLE_DEVICE_IDENTIFIER,
            value(&X_APPLE_DEVICE_IDENTIFIER, device_identifier)?,
        );
    }

    Ok(headers)
}

/// `Authorization: Bearer <api key>`.
pub(crate) fn authorization(api_key: &str) -> Result<HeaderMap, ConfigError> {
    let name = http::header::AUTHORIZATION;
    let mut headers = HeaderMap::new();
    let mut bearer = value(&name, &format!("Bearer {api_key}"))?;
    bearer.set_sensitive(true);
    headers.insert(name, bearer);
    Ok(headers)
}

fn value(name: &HeaderName, value: &str) -> Result<HeaderValue, ConfigError> {
    HeaderValue::from_str(value).map_err(|_| ConfigError::InvalidHeader {
        name: name.to_string(),
        value: value.to_owned(),
    })
}

fn flag(enabled: bool) -> HeaderValue {
    HeaderValue::from_static(if enabled { "true" } else { "false" })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PlatformInfo;

    #[test]
    fn test_optional_headers_are_omitted() {
        let headers = default_headers(&ClientConfig::builder("key").build()).unwrap();
        assert_eq!(headers["content-type"], "application/json");
        assert_eq!(headers["x-observer-mode-enabled"], "false");
        assert_eq!(headers["x-platform-flavor"], "native");
        assert!(!headers.contains_key("x-platform-flavor-version"));
        assert!(!headers.contains_key("x-apple-device-identifier"));
    }

    #[test]
    fn test_optional_headers_are_sent_when_set() {
        let config = ClientConfig::builder("key")
            .observer_mode(true)
            .platform(PlatformInfo {
                flavor: "flutter".into(),
                flavor_version: Some("3.1.0".into()),
                device_identifier: Some("ABC-123".into()),
                ..PlatformInfo::default()
            })
            .build();
        let headers = default_headers(&config).unwrap();
        assert_eq!(headers["x-observer-mode-enabled"], "true");
        assert_eq!(headers["x-platform-flavor"], "flutter");
        assert_eq!(headers["x-platform-flavor-version"], "3.1.0");
        assert_eq!(headers["x-apple-device-identifier"], "ABC-123");
    }

    #[test]
    fn test_invalid_header_value_is_rejected() {
        let config = ClientConfig::builder("key")
            .platform(PlatformInfo {
                client_version: "1.0\n".into(),
                ..PlatformInfo::default()
            })
            .build();
        assert!(matches!(
            default_headers(&config),
            Err(ConfigError::InvalidHeader { name, .. }) if name == "x-client-version"
        ));
    }

    #[test]
    fn test_authorization_is_bearer() {
        let headers = authorization("appl_abc").unwrap();
        assert_eq!(headers["authorization"], "Bearer appl_abc");
        assert!(headers["authorization"].is_sensitive());
    }
}
