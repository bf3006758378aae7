use crate::data::{Entry, Sense};
use crate::error::ParseError;
use crate::xml::{self, Element, Node};

/// Path root written into glyph image sources; the renderer swaps it for the
/// real asset host.
pub const GLYPH_PLACEHOLDER_ROOT: &str = "figurePlaceholderPath";

const ROOT_TAG: &str = "TEI";
const BODY_TAG: &str = "body";
const GLYPH_TAG: &str = "g";

/// Turns lexicon XML into entries, in document order.
pub fn transform(xml_text: &str) -> Result<Vec<Entry>, ParseError> {
    let document = xml::parse(xml_text)?;
    let root = take_root(document.root).ok_or(ParseError::MissingElement(ROOT_TAG))?;
    let root = substitute_glyphs(root);
    let body = root
        .find_first(BODY_TAG)
        .ok_or(ParseError::MissingElement(BODY_TAG))?;

    body.child_elements()
        .enumerate()
        .map(|(index, element)| extract_entry(index, element))
        .collect()
}

fn take_root(element: Element) -> Option<Element> {
    if element.name == ROOT_TAG {
        return Some(element);
    }
    element.children.into_iter().find_map(|child| match child {
        Node::Element(child) => take_root(child),
        _ => None,
    })
}

/// Replaces every glyph reference below `element` with a placeholder image.
pub fn substitute_glyphs(element: Element) -> Element {
    let children = element
        .children
        .into_iter()
        .map(|child| match child {
            Node::Element(child) if child.name == GLYPH_TAG => Node::Element(glyph_image(&child)),
            Node::Element(child) => Node::Element(substitute_glyphs(child)),
            other => other,
        })
        .collect();
    Element { children, ..element }
}

fn glyph_image(glyph: &Element) -> Element {
    Element::new("img").with_attribute(
        "src",
        format!("{GLYPH_PLACEHOLDER_ROOT}/{}.png", glyph_id(glyph)),
    )
}

/// `ref="#abc"` names glyph `abc`.
fn glyph_id(glyph: &Element) -> String {
    glyph
        .attribute("ref")
        .map(|value| value.chars().skip(1).collect())
        .unwrap_or_default()
}

fn extract_entry(index: usize, element: &Element) -> Result<Entry, ParseError> {
    let form = element
        .find_first("form")
        .ok_or(ParseError::IncompleteEntry {
            index,
            element: "form",
        })?;
    let sense = element
        .find_first("sense")
        .ok_or(ParseError::IncompleteEntry {
            index,
            element: "sense",
        })?;

    Ok(Entry {
        form: form.text_content(),
        sense: Sense {
            usg: sense
                .find_first("usg")
                .map(Element::text_content)
                .unwrap_or_default(),
            def: sense
                .find_first("def")
                .map(Element::inner_markup)
                .unwrap_or_default(),
            xr: sense
                .find_all("xr")
                .into_iter()
                .map(Element::text_content)
                .collect(),
        },
    })
}
