fn main() {
    println!("Run `cargo test -p wire-compat` to execute wire compatibility tests.");
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::PathBuf;

    use roomdrop_protocol::{
        FileFingerprint, RequestDescriptor, ServerCapabilities, UploadTarget, messages, response,
    };

    /// Returns the path to the fixtures directory.
    fn fixtures_dir() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("fixtures")
    }

    /// Loads a fixture JSON file and returns it as a `serde_json::Value`.
    fn load_fixture(name: &str) -> serde_json::Value {
        let path = fixtures_dir().join(name);
        let data = fs::read_to_string(&path)
            .unwrap_or_else(|e| panic!("failed to read fixture {}: {e}", path.display()));
        serde_json::from_str(&data)
            .unwrap_or_else(|e| panic!("failed to parse fixture {}: {e}", path.display()))
    }

    /// Deserializes a fixture into a Rust type, re-serializes it, and compares
    /// the JSON values.
    fn roundtrip_test<T>(name: &str) -> T
    where
        T: serde::de::DeserializeOwned + serde::Serialize,
    {
        let fixture = load_fixture(name);
        let parsed: T = serde_json::from_value(fixture.clone())
            .unwrap_or_else(|e| panic!("failed to deserialize {name}: {e}"));
        let reserialized = serde_json::to_value(&parsed)
            .unwrap_or_else(|e| panic!("failed to re-serialize {name}: {e}"));
        assert_eq!(
            fixture, reserialized,
            "roundtrip mismatch for {name}:\n  fixture: {fixture}\n  rust:    {reserialized}"
        );
        parsed
    }

    /// Checks that a built request matches its fixture exactly.
    fn assert_request(name: &str, built: &RequestDescriptor) {
        let expected: RequestDescriptor = roundtrip_test(name);
        assert_eq!(&expected, built, "request mismatch for {name}");
        assert_eq!(
            load_fixture(name),
            serde_json::to_value(built).unwrap(),
            "wire mismatch for {name}"
        );
    }

    fn sample_target() -> UploadTarget {
        roundtrip_test("upload_target.json")
    }

    // --- Requests ---

    #[test]
    fn fixture_capability_probe() {
        assert_request("capability_probe.json", &messages::capability_probe("/files/"));
    }

    #[test]
    fn fixture_create_resource() {
        let target = sample_target();
        assert_request(
            "create_resource.json",
            &messages::create_resource("/files/", &target).unwrap(),
        );
    }

    #[test]
    fn fixture_offset_query() {
        assert_request(
            "offset_query.json",
            &messages::offset_query("/files/", "24e533e0"),
        );
    }

    #[test]
    fn fixture_chunk_transfer() {
        assert_request(
            "chunk_transfer.json",
            &messages::chunk_transfer("/files/", "24e533e0", 400, 600),
        );
    }

    #[test]
    fn collection_without_trailing_slash_builds_same_paths() {
        let built = messages::offset_query("/files", "24e533e0");
        assert_request("offset_query.json", &built);
    }

    // --- Data model ---

    #[test]
    fn fixture_upload_target() {
        let target = sample_target();
        assert_eq!(target.file_name, "résumé final.pdf");
        assert_eq!(target.size_bytes, 1000);
    }

    #[test]
    fn fixture_server_capabilities() {
        let caps: ServerCapabilities = roundtrip_test("server_capabilities.json");
        assert!(caps.supports_creation());
        assert_eq!(caps.max_upload_size_bytes, Some(1 << 30));
    }

    #[test]
    fn fixture_probe_response() {
        let fixture = load_fixture("probe_response.json");
        let headers: Vec<(String, String)> =
            serde_json::from_value(fixture["headers"].clone()).unwrap();
        let expected: ServerCapabilities =
            serde_json::from_value(fixture["capabilities"].clone()).unwrap();

        let parsed = response::parse_capabilities(&headers).unwrap();
        assert_eq!(parsed, expected);
        assert_eq!(serde_json::to_value(&parsed).unwrap(), fixture["capabilities"]);
    }

    #[test]
    fn fixture_fingerprint_is_stable() {
        let fixture = load_fixture("fingerprint.json");
        let target: UploadTarget = serde_json::from_value(fixture["target"].clone()).unwrap();
        let expected: FileFingerprint =
            serde_json::from_value(fixture["fingerprint"].clone()).unwrap();
        assert_eq!(target.fingerprint(), expected);
    }

    #[test]
    fn metadata_header_decodes_to_target_fields() {
        let fixture = load_fixture("create_resource.json");
        let built: RequestDescriptor = serde_json::from_value(fixture).unwrap();
        let value = built.header("Upload-Metadata").unwrap();
        let pairs = messages::decode_metadata(value).unwrap();
        assert_eq!(
            pairs,
            vec![
                ("filename".to_string(), "résumé final.pdf".to_string()),
                ("filetype".to_string(), "application/pdf".to_string()),
            ]
        );
    }
}
