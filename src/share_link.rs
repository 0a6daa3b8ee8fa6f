use std::fs;
use std::path::PathBuf;

use minijinja::{context, Environment};
use qrcode::render::svg;
use qrcode::QrCode;
use serde_json::Value;

use crate::error::ApiError;
use crate::homeserver::ProfileInfo;
use crate::uri::{self, CanonicalUri, ShareTarget};

const BUILTIN_TEMPLATE: &str = include_str!("../templates/link_preview.html");
const TEMPLATE_FILE: &str = "link_preview.html";

/// Renders one static preview page per unique share link, keyed by the
/// content hash of the canonical URI. Writes are idempotent: the same
/// logical input produces the same bytes at the same path.
pub struct ShareLinkGenerator {
    url_prefix: String,
    target_path: PathBuf,
    template_dir: Option<PathBuf>,
}

impl ShareLinkGenerator {
    pub fn new(url_prefix: String, target_path: PathBuf, template_dir: Option<PathBuf>) -> Self {
        Self {
            url_prefix,
            target_path,
            template_dir,
        }
    }

    pub fn generate(
        &self,
        target: &ShareTarget,
        query: Option<&Value>,
        requester: &str,
        sharer: &ProfileInfo,
    ) -> Result<CanonicalUri, ApiError> {
        let path = target.path();
        let canonical = uri::canonicalize(&self.url_prefix, &path, query, requester)?;

        let qr_svg = QrCode::new(canonical.target_uri.as_bytes())?
            .render::<svg::Color>()
            .min_dimensions(240, 240)
            .build();
        let sharer_name = sharer
            .display_name
            .clone()
            .unwrap_or_else(|| uri::localpart(requester));

        let html = self.render(target.icon(), &sharer_name, &canonical, &qr_svg)?;

        fs::create_dir_all(&self.target_path)?;
        let artifact = self
            .target_path
            .join(format!("{}.html", canonical.target_hash));
        fs::write(&artifact, html)?;
        tracing::debug!("wrote share link artifact {:?}", artifact);

        Ok(canonical)
    }

    fn render(
        &self,
        icon: &str,
        sharer_name: &str,
        canonical: &CanonicalUri,
        qr_svg: &str,
    ) -> Result<String, ApiError> {
        let source = self.template_source()?;
        let mut env = Environment::new();
        env.add_template(TEMPLATE_FILE, &source)?;
        let rendered = env.get_template(TEMPLATE_FILE)?.render(context! {
            icon => icon,
            sharer_name => sharer_name,
            url => canonical.url,
            target_uri => canonical.target_uri,
            qr_svg => qr_svg,
        })?;
        Ok(rendered)
    }

    /// First match wins: the configured override directory, then the
    /// bundled template.
    fn template_source(&self) -> Result<String, ApiError> {
        if let Some(dir) = &self.template_dir {
            let candidate = dir.join(TEMPLATE_FILE);
            if candidate.is_file() {
                return Ok(fs::read_to_string(candidate)?);
            }
        }
        Ok(BUILTIN_TEMPLATE.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sha1::{Digest, Sha1};

    const PREFIX: &str = "https://app.example.com/p/";

    fn temp_dir(label: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("share-links-{label}-{}", uuid::Uuid::new_v4()));
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn pin_target() -> ShareTarget {
        ShareTarget::SpaceObject {
            room_id: "r1".into(),
            object_type: "pin".into(),
            object_id: "o1".into(),
        }
    }

    #[test]
    fn test_generate_writes_content_addressed_artifact() {
        let dir = temp_dir("basic");
        let generator = ShareLinkGenerator::new(PREFIX.into(), dir.clone(), None);

        let canonical = generator
            .generate(&pin_target(), None, "@alice:test", &ProfileInfo::default())
            .unwrap();

        let expected_hash =
            hex::encode(Sha1::digest(format!("{PREFIX}?userId=alice#o/r1/pin/o1").as_bytes()));
        assert_eq!(canonical.target_hash, expected_hash);

        let artifact = dir.join(format!("{expected_hash}.html"));
        assert!(artifact.is_file());
        let html = fs::read_to_string(&artifact).unwrap();
        assert!(html.contains("<svg"));
        assert!(html.contains(&canonical.url));
        // no display name on the profile: fall back to the localpart
        assert!(html.contains("alice"));
    }

    #[test]
    fn test_generate_is_idempotent_per_hash() {
        let dir = temp_dir("idempotent");
        let generator = ShareLinkGenerator::new(PREFIX.into(), dir.clone(), None);

        let first = generator
            .generate(&pin_target(), None, "@alice:test", &ProfileInfo::default())
            .unwrap();
        let second = generator
            .generate(&pin_target(), None, "@alice:test", &ProfileInfo::default())
            .unwrap();
        assert_eq!(first, second);
        assert_eq!(fs::read_dir(&dir).unwrap().count(), 1);
    }

    #[test]
    fn test_template_override_wins_over_builtin() {
        let artifacts = temp_dir("override-artifacts");
        let templates = temp_dir("override-templates");
        fs::write(
            templates.join(TEMPLATE_FILE),
            "custom: {{ sharer_name }} -> {{ url }}",
        )
        .unwrap();

        let generator =
            ShareLinkGenerator::new(PREFIX.into(), artifacts.clone(), Some(templates));
        let sharer = ProfileInfo {
            display_name: Some("Meeko".into()),
            avatar_url: None,
        };
        let canonical = generator
            .generate(&pin_target(), None, "@meeko:test", &sharer)
            .unwrap();

        let html =
            fs::read_to_string(artifacts.join(format!("{}.html", canonical.target_hash))).unwrap();
        assert!(html.starts_with("custom: Meeko -> "));
    }

    #[test]
    fn test_missing_override_falls_back_to_builtin() {
        let artifacts = temp_dir("fallback-artifacts");
        let empty = temp_dir("fallback-templates");

        let generator = ShareLinkGenerator::new(PREFIX.into(), artifacts.clone(), Some(empty));
        let canonical = generator
            .generate(&pin_target(), None, "@alice:test", &ProfileInfo::default())
            .unwrap();

        let html =
            fs::read_to_string(artifacts.join(format!("{}.html", canonical.target_hash))).unwrap();
        assert!(html.contains("shared something with you"));
    }
}
