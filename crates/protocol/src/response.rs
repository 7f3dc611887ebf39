//! Parsing of server response headers.

use crate::ProtocolError;
use crate::constants::*;
use crate::types::ServerCapabilities;

/// Returns the value of the first header named `name` (case-insensitive).
pub fn header_value<'a>(headers: &'a [(String, String)], name: &str) -> Option<&'a str> {
    headers
        .iter()
        .find(|(k, _)| k.eq_ignore_ascii_case(name))
        .map(|(_, v)| v.trim())
}

fn comma_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_u64(name: &'static str, value: &str) -> Result<u64, ProtocolError> {
    value.parse::<u64>().map_err(|_| ProtocolError::InvalidHeader {
        name,
        value: value.to_string(),
    })
}

/// Parses the headers of a capability probe response.
///
/// `Tus-Version` lists supported versions; `Tus-Resumable` is the version
/// the server answered with. Either one is enough to know what the server
/// speaks.
pub fn parse_capabilities(headers: &[(String, String)]) -> Result<ServerCapabilities, ProtocolError> {
    let resumable = header_value(headers, HEADER_RESUMABLE).filter(|v| !v.is_empty());
    let mut supported_versions = header_value(headers, HEADER_VERSION)
        .map(comma_list)
        .unwrap_or_default();

    let protocol_version = match (resumable, supported_versions.first()) {
        (Some(v), _) => v.to_string(),
        (None, Some(first)) => first.clone(),
        (None, None) => return Err(ProtocolError::MissingHeader(HEADER_VERSION)),
    };
    if supported_versions.is_empty() {
        supported_versions.push(protocol_version.clone());
    }

    let max_upload_size_bytes = header_value(headers, HEADER_MAX_SIZE)
        .filter(|v| !v.is_empty())
        .map(|v| parse_u64(HEADER_MAX_SIZE, v))
        .transpose()?;

    let extensions = header_value(headers, HEADER_EXTENSION)
        .map(comma_list)
        .unwrap_or_default();

    Ok(ServerCapabilities {
        protocol_version,
        supported_versions,
        max_upload_size_bytes,
        extensions,
    })
}

/// Checks that the server can serve this client.
///
/// Returns a human-readable reason when it cannot.
pub fn check_capabilities(caps: &ServerCapabilities, expected_version: &str) -> Result<(), String> {
    if !caps.supports_version(expected_version) {
        return Err(format!(
            "server supports protocol versions [{}], client requires {expected_version}",
            caps.supported_versions.join(", ")
        ));
    }
    if !caps.supports_creation() {
        return Err(format!(
            "server does not support the `{EXTENSION_CREATION}` extension"
        ));
    }
    Ok(())
}

/// Reads the server's `Upload-Offset`.
pub fn parse_offset(headers: &[(String, String)]) -> Result<u64, ProtocolError> {
    let value = header_value(headers, HEADER_UPLOAD_OFFSET)
        .ok_or(ProtocolError::MissingHeader(HEADER_UPLOAD_OFFSET))?;
    parse_u64(HEADER_UPLOAD_OFFSET, value)
}

/// Reads the `Location` of a newly created resource and extracts its id.
pub fn parse_location(headers: &[(String, String)]) -> Result<String, ProtocolError> {
    let location = header_value(headers, HEADER_LOCATION)
        .ok_or(ProtocolError::MissingHeader(HEADER_LOCATION))?;
    resource_id_from_location(location)
}

/// Extracts the opaque resource id from an absolute or relative URL: the last
/// non-empty path segment, ignoring any query string or fragment.
pub fn resource_id_from_location(location: &str) -> Result<String, ProtocolError> {
    let without_suffix = location
        .split(['?', '#'])
        .next()
        .unwrap_or_default();
    let path = match without_suffix.split_once("://") {
        Some((_, rest)) => rest.split_once('/').map(|(_, p)| p).unwrap_or_default(),
        None => without_suffix,
    };
    path.rsplit('/')
        .find(|segment| !segment.is_empty())
        .map(str::to_string)
        .ok_or_else(|| ProtocolError::InvalidLocation(location.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(pairs: &[(&str, &str)]) -> Vec<(String, String)> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let h = headers(&[("upload-offset", " 42 ")]);
        assert_eq!(header_value(&h, "Upload-Offset"), Some("42"));
        assert_eq!(header_value(&h, "Upload-Length"), None);
    }

    #[test]
    fn parses_full_capabilities() {
        let h = headers(&[
            ("Tus-Resumable", "1.0.0"),
            ("Tus-Version", "1.0.0,0.2.2, 0.2.1"),
            ("Tus-Max-Size", "1073741824"),
            ("Tus-Extension", "creation,expiration, termination"),
        ]);
        let caps = parse_capabilities(&h).unwrap();
        assert_eq!(caps.protocol_version, "1.0.0");
        assert_eq!(caps.supported_versions, vec!["1.0.0", "0.2.2", "0.2.1"]);
        assert_eq!(caps.max_upload_size_bytes, Some(1_073_741_824));
        assert_eq!(caps.extensions, vec!["creation", "expiration", "termination"]);
        assert!(check_capabilities(&caps, "1.0.0").is_ok());
    }

    #[test]
    fn version_list_alone_is_enough() {
        let h = headers(&[("Tus-Version", "1.0.0"), ("Tus-Extension", "creation")]);
        let caps = parse_capabilities(&h).unwrap();
        assert_eq!(caps.protocol_version, "1.0.0");
        assert!(caps.max_upload_size_bytes.is_none());
    }

    #[test]
    fn resumable_alone_is_enough() {
        let h = headers(&[("Tus-Resumable", "1.0.0")]);
        let caps = parse_capabilities(&h).unwrap();
        assert_eq!(caps.supported_versions, vec!["1.0.0"]);
        assert!(caps.extensions.is_empty());
    }

    #[test]
    fn missing_version_is_an_error() {
        let h = headers(&[("Tus-Extension", "creation")]);
        assert!(matches!(
            parse_capabilities(&h),
            Err(ProtocolError::MissingHeader("Tus-Version"))
        ));
    }

    #[test]
    fn bad_max_size_is_an_error() {
        let h = headers(&[("Tus-Resumable", "1.0.0"), ("Tus-Max-Size", "lots")]);
        assert!(matches!(
            parse_capabilities(&h),
            Err(ProtocolError::InvalidHeader { name: "Tus-Max-Size", .. })
        ));
    }

    #[test]
    fn version_mismatch_is_rejected() {
        let h = headers(&[("Tus-Version", "2.0.0"), ("Tus-Extension", "creation")]);
        let caps = parse_capabilities(&h).unwrap();
        let reason = check_capabilities(&caps, "1.0.0").unwrap_err();
        assert!(reason.contains("2.0.0"));
    }

    #[test]
    fn missing_creation_is_rejected() {
        let h = headers(&[("Tus-Version", "1.0.0"), ("Tus-Extension", "termination")]);
        let caps = parse_capabilities(&h).unwrap();
        let reason = check_capabilities(&caps, "1.0.0").unwrap_err();
        assert!(reason.contains("creation"));
    }

    #[test]
    fn parses_offset() {
        assert_eq!(parse_offset(&headers(&[("Upload-Offset", "400")])).unwrap(), 400);
        assert!(matches!(
            parse_offset(&headers(&[])),
            Err(ProtocolError::MissingHeader("Upload-Offset"))
        ));
        assert!(matches!(
            parse_offset(&headers(&[("Upload-Offset", "-1")])),
            Err(ProtocolError::InvalidHeader { .. })
        ));
    }

    #[test]
    fn resource_id_from_various_locations() {
        assert_eq!(
            resource_id_from_location("https://up.example.com/files/24e533e0").unwrap(),
            "24e533e0"
        );
        assert_eq!(resource_id_from_location("/files/abc/").unwrap(), "abc");
        assert_eq!(
            resource_id_from_location("http://h:8080/files/abc?token=1#frag").unwrap(),
            "abc"
        );
        assert_eq!(resource_id_from_location("abc").unwrap(), "abc");
    }

    #[test]
    fn empty_location_is_rejected() {
        assert!(resource_id_from_location("https://host").is_err());
        assert!(resource_id_from_location("/").is_err());
        assert!(matches!(
            parse_location(&headers(&[])),
            Err(ProtocolError::MissingHeader("Location"))
        ));
    }
}
