//! Output formatting for acquired artifacts.
//!
//! The binary prints the metadata of the acquired package to stdout, either
//! as aligned `key: value` lines or as JSON for scripting.

use crate::package::ArtifactMetadata;

/// Format metadata for human-readable output.
///
/// # Examples
///
/// ```
/// use stevedore_acquirer::output::format_human;
/// use stevedore_acquirer::package::ArtifactMetadata;
///
/// let meta = ArtifactMetadata {
///     package_id: "nginx".to_owned(),
///     version: "1.21".to_owned(),
///     extension: String::new(),
///     reference: "nginx:1.21".to_owned(),
///     hash: "sha256:0123".to_owned(),
///     size: 2048,
/// };
/// let text = format_human(&meta);
/// assert!(text.contains("reference: nginx:1.21"));
/// assert!(!text.contains("extension"));
/// ```
#[must_use]
pub fn format_human(meta: &ArtifactMetadata) -> String {
    let mut fields = vec![
        ("package", meta.package_id.as_str()),
        ("version", meta.version.as_str()),
    ];
    if !meta.extension.is_empty() {
        fields.push(("extension", meta.extension.as_str()));
    }
    fields.push(("reference", meta.reference.as_str()));
    fields.push(("hash", meta.hash.as_str()));

    let size = meta.size.to_string();
    fields.push(("size", size.as_str()));

    fields
        .iter()
        .map(|(key, value)| format!("{key}: {value}"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Format metadata as pretty-printed JSON.
///
/// # Examples
///
/// ```
/// use stevedore_acquirer::output::format_json;
/// use stevedore_acquirer::package::ArtifactMetadata;
///
/// let meta = ArtifactMetadata {
///     package_id: "nginx".to_owned(),
///     version: "1.2.3".to_owned(),
///     extension: ".tgz".to_owned(),
///     reference: "/cache/feeds-charts/nginx-1.2.3.tgz".to_owned(),
///     hash: "ab12".to_owned(),
///     size: 7,
/// };
/// assert!(format_json(&meta).contains("\"package_id\": \"nginx\""));
/// ```
#[must_use]
pub fn format_json(meta: &ArtifactMetadata) -> String {
    serde_json::to_string_pretty(meta).unwrap_or_else(|_| "{}".to_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::{fixture, rstest};

    #[fixture]
    fn chart() -> ArtifactMetadata {
        ArtifactMetadata {
            package_id: "nginx".to_owned(),
            version: "1.2.3".to_owned(),
            extension: ".tgz".to_owned(),
            reference: "/cache/feeds-charts/nginx-1.2.3.tgz".to_owned(),
            hash: "ab12".to_owned(),
            size: 7,
        }
    }

    #[rstest]
    fn human_output_lists_every_field(chart: ArtifactMetadata) {
        assert_eq!(
            format_human(&chart),
            concat!(
                "package: nginx\n",
                "version: 1.2.3\n",
                "extension: .tgz\n",
                "reference: /cache/feeds-charts/nginx-1.2.3.tgz\n",
                "hash: ab12\n",
                "size: 7",
            )
        );
    }

    #[rstest]
    fn json_output_round_trips_through_serde(chart: ArtifactMetadata) {
        let value: serde_json::Value = serde_json::from_str(&format_json(&chart)).expect("valid JSON");
        assert_eq!(
            value.get("reference").and_then(serde_json::Value::as_str),
            Some("/cache/feeds-charts/nginx-1.2.3.tgz")
        );
        assert_eq!(value.get("size").and_then(serde_json::Value::as_u64), Some(7));
        assert_eq!(value.get("extension").and_then(serde_json::Value::as_str), Some(".tgz"));
    }
}
