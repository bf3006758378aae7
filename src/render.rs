//! Definition rendering with cross-reference links.

use crate::config::EngineConfig;
use crate::data::Sense;
use crate::transform::GLYPH_PLACEHOLDER_ROOT;

#[derive(Debug, Clone)]
pub struct Renderer {
    glyph_prefix: String,
    config: EngineConfig,
}

impl Renderer {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            glyph_prefix: config.glyph_url_prefix(),
            config: config.clone(),
        }
    }

    /// `（usg）def` with glyph placeholders resolved and each cross-reference
    /// linked once.
    ///
    /// Targets are consumed last to first, each matched at its last occurrence
    /// in the text left of the previous cut. A target missing from the
    /// remaining text consumes that text unlinked.
    pub fn render(&self, sense: &Sense) -> String {
        if sense.def.is_empty() {
            return String::new();
        }

        let mut remaining = sense.def.replace(GLYPH_PLACEHOLDER_ROOT, &self.glyph_prefix);
        let mut pieces: Vec<String> = Vec::with_capacity(sense.xr.len() + 1);
        for xr in sense.xr.iter().rev() {
            match remaining.rfind(xr.as_str()) {
                Some(at) => {
                    let tail = &remaining[at + xr.len()..];
                    pieces.push(format!("{}{tail}", self.link(xr)));
                    remaining.truncate(at);
                }
                None => pieces.push(std::mem::take(&mut remaining)),
            }
        }
        pieces.push(remaining);

        let mut out = format!("（{}）", sense.usg);
        for piece in pieces.iter().rev() {
            out.push_str(piece);
        }
        out
    }

    pub fn link(&self, form: &str) -> String {
        format!("<a href=\"{}\">{form}</a>", self.config.entry_link(form))
    }
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new(&EngineConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transform::transform;

    fn sense(usg: &str, def: &str, xr: &[&str]) -> Sense {
        Sense {
            usg: usg.to_string(),
            def: def.to_string(),
            xr: xr.iter().map(|s| s.to_string()).collect(),
        }
    }

    fn renderer() -> Renderer {
        Renderer::new(&EngineConfig {
            asset_host: "cdn.test".into(),
            link_base: "/dfb".into(),
            ..EngineConfig::default()
        })
    }

    #[test]
    fn links_single_cross_reference() {
        let out = renderer().render(&sense("名", "見<xr>火</xr>", &["火"]));
        assert_eq!(
            out,
            "（名）見<xr><a href=\"/dfb/entry/entry/火\">火</a></xr>"
        );
    }

    #[test]
    fn lexicon_entry_with_nested_xr_keeps_the_tag() {
        let xml = "<TEI><text><body><entry><form>水</form><sense><usg>名</usg>\
                   <def>見<xr>火</xr></def></sense></entry></body></text></TEI>";
        let entries = transform(xml).unwrap();
        assert_eq!(entries[0].sense.xr, vec!["火"]);
        let out = Renderer::default().render(&entries[0].sense);
        assert_eq!(out, "（名）見<xr><a href=\"/entry/entry/火\">火</a></xr>");
    }

    #[test]
    fn plain_definition_links_target() {
        let out = renderer().render(&sense("名", "見火", &["火"]));
        assert_eq!(out, "（名）見<a href=\"/dfb/entry/entry/火\">火</a>");
    }

    #[test]
    fn empty_definition_renders_nothing() {
        assert_eq!(renderer().render(&sense("名", "", &["火"])), "");
    }

    #[test]
    fn glyph_placeholders_resolve_to_asset_host() {
        let out = renderer().render(&sense(
            "名",
            "<img src=\"figurePlaceholderPath/a.png\"/><img src=\"figurePlaceholderPath/b.png\"/>",
            &[],
        ));
        assert_eq!(
            out,
            "（名）<img src=\"https://cdn.test/assets/gaiji/a.png\"/><img src=\"https://cdn.test/assets/gaiji/b.png\"/>"
        );
    }

    #[test]
    fn each_distinct_target_is_linked_once() {
        let out = renderer().render(&sense("名", "參甲、乙、丙。", &["甲", "乙", "丙"]));
        assert_eq!(out.matches("<a href=").count(), 3);
        assert_eq!(
            out,
            "（名）參<a href=\"/dfb/entry/entry/甲\">甲</a>、<a href=\"/dfb/entry/entry/乙\">乙</a>、<a href=\"/dfb/entry/entry/丙\">丙</a>。"
        );
    }

    #[test]
    fn repeated_substring_links_the_cited_occurrence() {
        // "法" appears inside "法身" before it is cited at the end.
        let out = renderer().render(&sense("術", "法身之法。見法", &["法"]));
        assert_eq!(out, "（術）法身之法。見<a href=\"/dfb/entry/entry/法\">法</a>");
    }

    #[test]
    fn missing_target_consumes_remaining_text_unlinked() {
        let out = renderer().render(&sense("名", "見甲及乙", &["甲", "無", "乙"]));
        // "乙" is cut first, "無" is absent and swallows "見甲及", so "甲" has
        // nothing left to match.
        assert_eq!(out, "（名）見甲及<a href=\"/dfb/entry/entry/乙\">乙</a>");
        assert_eq!(out.matches("<a href=").count(), 1);
    }

    #[test]
    fn render_does_not_mutate_cross_reference_order() {
        let input = sense("名", "甲乙", &["甲", "乙"]);
        let r = renderer();
        let first = r.render(&input);
        assert_eq!(input.xr, vec!["甲", "乙"]);
        assert_eq!(first, r.render(&input));
    }

    #[test]
    fn missing_sense_placeholder_renders() {
        let out = Renderer::default().render(&Sense::missing("木"));
        assert_eq!(out, "（❌）找不到單辭「木」");
    }
}
