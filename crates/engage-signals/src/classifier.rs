use crate::event::{ContentEvent, InteractionKind};

/// Flattened view of one element in a clicked node's ancestor chain, as
/// forwarded by the cooperative in-frame reporter.
#[derive(Debug, Clone, Default)]
pub struct ElementRef {
    pub id: Option<String>,
    pub classes: Vec<String>,
    pub rel: Option<String>,
    pub href: Option<String>,
}

/// Tokens that mark an element as part of an ad unit. Best-effort: markup
/// drifts, so classification only ever upgrades a click to an ad click.
const AD_MARKERS: &[&str] = &[
    "ad", "ads", "advert", "advertisement", "adsby", "sponsor", "sponsored", "banner", "promo",
    "promoted", "doubleclick", "taboola", "outbrain",
];

const AD_HOSTS: &[&str] = &["doubleclick.net", "googlesyndication.com", "adservice"];

/// Classify a click by walking the element's ancestor chain for ad
/// markers: a `sponsored` link relation, marker tokens in id/class, or a
/// known ad-network href.
pub fn classify_click(chain: &[ElementRef]) -> ContentEvent {
    for element in chain {
        if is_ad_element(element) {
            return ContentEvent::AdClick;
        }
    }
    ContentEvent::Interaction {
        kind: InteractionKind::Click,
    }
}

fn is_ad_element(element: &ElementRef) -> bool {
    if let Some(rel) = &element.rel {
        if rel
            .split_ascii_whitespace()
            .any(|token| token.eq_ignore_ascii_case("sponsored"))
        {
            return true;
        }
    }

    if let Some(id) = &element.id {
        if has_ad_token(id) {
            return true;
        }
    }

    if element.classes.iter().any(|class| has_ad_token(class)) {
        return true;
    }

    if let Some(href) = &element.href {
        let href = href.to_ascii_lowercase();
        if AD_HOSTS.iter().any(|host| href.contains(host)) {
            return true;
        }
    }

    false
}

/// Token-wise match so "ad-slot" and "sidebar_ads" hit while "badge" and
/// "header" do not.
fn has_ad_token(value: &str) -> bool {
    value
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
        .any(|token| {
            let token = token.to_ascii_lowercase();
            AD_MARKERS.iter().any(|marker| token == *marker)
        })
}
