//! Action-token grammar.
//!
//! An action path is a `/`-separated list of stages. The first stage names
//! the processor, every following stage is one action token of the form
//! `name` or `name,k1_v1,k2_v2,...`.

use std::fmt;

use mg_core::{Error, Result};

/// Separator between stages of an action path.
pub const STAGE_SEPARATOR: char = '/';

/// Separator between an action name and its parameter segments.
pub const PARAM_SEPARATOR: char = ',';

/// One parsed action invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionToken {
    /// Leading segment; matches a registered action name.
    pub name: String,
    /// Raw parameter segments, in request order.
    pub params: Vec<String>,
}

impl ActionToken {
    /// Parse the textual form of a single token.
    ///
    /// Empty parameter segments are dropped, so `resize,,w_1,` parses like
    /// `resize,w_1` and displays as the latter.
    pub fn parse(raw: &str) -> Result<Self> {
        let mut segments = raw.split(PARAM_SEPARATOR);
        let name = segments.next().unwrap_or_default().trim();
        if name.is_empty() {
            return Err(Error::invalid(format!("empty action name in token {raw:?}")));
        }

        let params = segments
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            name: name.to_string(),
            params,
        })
    }
}

impl fmt::Display for ActionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name)?;
        for p in &self.params {
            write!(f, "{PARAM_SEPARATOR}{p}")?;
        }
        Ok(())
    }
}

/// Split an action path into its non-empty stages.
pub fn split_action_path(path: &str) -> Vec<String> {
    path.split(STAGE_SEPARATOR)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Join stages back into an action path.
pub fn join_action_path<S: AsRef<str>>(stages: &[S]) -> String {
    stages
        .iter()
        .map(AsRef::as_ref)
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_name_only() {
        let t = ActionToken::parse("info").unwrap();
        assert_eq!(t.name, "info");
        assert!(t.params.is_empty());
    }

    #[test]
    fn parse_keyed_and_bare_params() {
        let t = ActionToken::parse("resize,w_100,h_50,m_fixed").unwrap();
        assert_eq!(t.name, "resize");
        assert_eq!(t.params, vec!["w_100", "h_50", "m_fixed"]);

        let t = ActionToken::parse("rotate,90").unwrap();
        assert_eq!(t.params, vec!["90"]);
    }

    #[test]
    fn empty_name_is_rejected() {
        assert!(matches!(
            ActionToken::parse(",w_100"),
            Err(Error::InvalidArgument(_))
        ));
        assert!(ActionToken::parse("").is_err());
    }

    #[test]
    fn display_reproduces_the_token() {
        for raw in ["resize,w_100,h_50", "format,webp", "info", "watermark,image_aGVsbG8,t_50"] {
            assert_eq!(ActionToken::parse(raw).unwrap().to_string(), raw);
        }
    }

    #[test]
    fn split_drops_empty_stages() {
        assert_eq!(
            split_action_path("/image//resize,w_100/"),
            vec!["image", "resize,w_100"]
        );
        assert!(split_action_path("").is_empty());
        assert!(split_action_path("///").is_empty());
    }

    #[test]
    fn path_round_trip() {
        let cases: &[(&str, &[&str])] = &[
            ("image", &["image"]),
            ("image/info", &["image", "info"]),
            ("image/rotate,90/format,webp", &["image", "rotate,90", "format,webp"]),
            (
                "image/resize,w_100,h_100/quality,q_80/format,webp",
                &["image", "resize,w_100,h_100", "quality,q_80", "format,webp"],
            ),
            // Values may themselves contain `_`.
            ("image/watermark,image_YS9i_Yw,t_50", &["image", "watermark,image_YS9i_Yw,t_50"]),
            ("video/snapshot,t_1000,f_jpg,m_fast", &["video", "snapshot,t_1000,f_jpg,m_fast"]),
        ];
        for (path, stages) in cases {
            let split = split_action_path(path);
            assert_eq!(&split, stages, "{path}");
            assert_eq!(&join_action_path(&split), path);
            for stage in &split {
                assert_eq!(&ActionToken::parse(stage).unwrap().to_string(), stage);
            }
        }
    }

    #[test]
    fn empty_param_segments_are_dropped() {
        let t = ActionToken::parse("resize,,w_1,").unwrap();
        assert_eq!(t.params, vec!["w_1"]);
        assert_eq!(t.to_string(), "resize,w_1");
        assert_eq!(ActionToken::parse("info,").unwrap().to_string(), "info");
    }
}
