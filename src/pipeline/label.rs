use image::DynamicImage;
use image::imageops::FilterType;
use regex::Regex;
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::{debug, info, warn};

use super::config::PipelineConfig;
use super::normalize::Component;
use super::segment::Segment;
use crate::oracles::LabelingOracle;

const MAX_LABEL_WORDS: usize = 3;
const MAX_LABEL_CHARS: usize = 40;

const NOISE_TOKENS: [&str; 5] = [
    "<|end_of_text|>",
    "<fim_prefix>",
    "<|system|>",
    "<|user|>",
    "<|assistant|>",
];

const REFUSAL_MARKERS: [&str; 10] = [
    "i am unable",
    "i cannot",
    "i'm unable",
    "sorry",
    "i don't",
    "not possible",
    "no text",
    "cannot determine",
    "unable to",
    "i can't",
];

static WHITESPACE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\s+").unwrap());
static QUOTED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"['"]([^'"]{1,40})['"]"#).unwrap());
static VERBOSE_PREFIXES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"(?i)^the\s+component\s+(name\s+)?is\s+(called\s+)?",
        r"(?i)^this\s+(is\s+(a|an|the)\s+)?",
        r"(?i)^it\s+(is\s+(a|an|the)\s+)?",
        r"(?i)^the\s+name\s+(of\s+this\s+component\s+)?is\s+",
        r"(?i)^component\s+name:\s*",
        r"(?i)^name:\s*",
    ]
    .into_iter()
    .map(|pattern| Regex::new(pattern).unwrap())
    .collect()
});
static TRAILING_PUNCT: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"[.;,!?]+$").unwrap());
static TRAILING_COMPONENT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\s+component$").unwrap());
static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^component \d+$").unwrap());

pub const UNKNOWN_LABEL: &str = "Unknown";

/// Reduces a free-form vision reply to a short component name. Refusals map
/// to `Unknown`; replies with nothing left after cleanup give `None`.
pub fn clean_label(raw: &str) -> Option<String> {
    let mut label = raw.trim().to_string();
    for token in NOISE_TOKENS {
        label = label.replace(token, "");
    }
    let label = label.trim_matches(|c: char| ".-:; ".contains(c));
    let mut label = WHITESPACE.replace_all(label, " ").trim().to_string();
    if label.is_empty() {
        return None;
    }

    let lower = label.to_lowercase();
    if REFUSAL_MARKERS.iter().any(|marker| lower.contains(marker)) {
        return Some(UNKNOWN_LABEL.to_string());
    }

    let quoted = QUOTED
        .captures(&label)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string());
    match quoted {
        Some(inner) => label = inner,
        None => {
            for prefix in VERBOSE_PREFIXES.iter() {
                label = strip_pattern(prefix, &label);
            }
        }
    }

    label = strip_pattern(&TRAILING_PUNCT, &label);
    label = strip_pattern(&TRAILING_COMPONENT, &label);

    let words: Vec<&str> = label.split_whitespace().collect();
    if words.len() > MAX_LABEL_WORDS {
        label = words[..MAX_LABEL_WORDS].join(" ");
    }

    if label.chars().count() > MAX_LABEL_CHARS {
        let head: String = label.chars().take(MAX_LABEL_CHARS).collect();
        label = match head.rfind(' ') {
            Some(idx) => head[..idx].to_string(),
            None => head,
        };
    }

    (!label.is_empty()).then_some(label)
}

fn strip_pattern(pattern: &Regex, text: &str) -> String {
    pattern.replace(text, "").trim().to_string()
}

pub fn placeholder_label(index: usize) -> String {
    format!("Component {}", index + 1)
}

pub fn is_placeholder(label: &str) -> bool {
    PLACEHOLDER.is_match(label.trim())
}

#[derive(Debug, Clone)]
pub struct Labeled {
    pub components: Vec<Component>,
    /// Oracle calls that returned an error.
    pub errors: usize,
    /// Components that needed the oracle while none was configured.
    pub unlabeled: usize,
}

/// Labels each component from its hint or from the oracle, falling back to a
/// positional placeholder. `segments` are the pre-normalization boxes, one per
/// component.
pub async fn label_components(
    components: Vec<Component>,
    segments: &[Segment],
    image: &DynamicImage,
    hints: &[String],
    labeler: Option<&dyn LabelingOracle>,
    config: &PipelineConfig,
) -> Labeled {
    let mut labeled = Vec::with_capacity(components.len());
    let mut errors = 0;
    let mut unlabeled = 0;

    for (i, (mut component, seg)) in components.into_iter().zip(segments).enumerate() {
        component.description = None;

        if let Some(hint) = hints.get(i).filter(|hint| !hint.is_empty()) {
            component.label = Some(hint.clone());
            labeled.push(component);
            continue;
        }

        let Some(oracle) = labeler else {
            unlabeled += 1;
            component.label = Some(placeholder_label(i));
            labeled.push(component);
            continue;
        };

        let Some((x, y, w, h)) = seg.box_pixels.pixel_rect(image.width(), image.height()) else {
            warn!("label: {} has no pixels to crop", component.id);
            component.label = Some(placeholder_label(i));
            labeled.push(component);
            continue;
        };

        let mut crop = image.crop_imm(x, y, w, h);
        if w.max(h) > config.label_max_edge {
            crop = crop.resize(config.label_max_edge, config.label_max_edge, FilterType::Lanczos3);
        }

        let label = match oracle.label(crop).await {
            Ok(reply) => reply.as_deref().and_then(clean_label),
            Err(err) => {
                errors += 1;
                warn!("label: {} failed on {}: {:#}", oracle.name(), component.id, err);
                None
            }
        };
        debug!("label: {} -> {:?}", component.id, label);
        component.label = Some(label.unwrap_or_else(|| placeholder_label(i)));
        labeled.push(component);
    }

    Labeled {
        components: labeled,
        errors,
        unlabeled,
    }
}

/// Keeps the highest-confidence component per distinct label (case-insensitive),
/// in original order, capped at `max_components`. Placeholders and
/// unknown/unlabeled components are never merged.
pub fn deduplicate_by_label(components: Vec<Component>, max_components: usize) -> Vec<Component> {
    let mut winners: HashMap<String, usize> = HashMap::new();
    let mut keep = vec![false; components.len()];

    for (i, component) in components.iter().enumerate() {
        let key = component
            .label
            .as_deref()
            .map(|label| label.trim().to_lowercase())
            .unwrap_or_default();
        if key.is_empty() || is_placeholder(&key) || key == "unknown" || key == "unlabeled" {
            keep[i] = true;
            continue;
        }
        match winners.get(&key).copied() {
            None => {
                winners.insert(key, i);
                keep[i] = true;
            }
            Some(prev) if component.confidence > components[prev].confidence => {
                keep[prev] = false;
                keep[i] = true;
                winners.insert(key, i);
            }
            Some(_) => {}
        }
    }

    let before = components.len();
    let mut out: Vec<Component> = components
        .into_iter()
        .zip(keep)
        .filter_map(|(component, kept)| kept.then_some(component))
        .collect();
    if out.len() > max_components {
        info!("truncating {} components to {}", out.len(), max_components);
        out.truncate(max_components);
    }
    debug!("label dedup: {} -> {}", before, out.len());
    out
}
