//! Headline cleanup.
//!
//! Aggregated headlines usually carry the outlet name after a separator
//! (`"Gaza ceasefire deal reached – Reuters"`, `"... | AP News"`). Cleaning
//! strips those so the same story from different outlets compares equal.

use newswatch_shared::FiltersConfig;

/// Strips trailing outlet markers from raw titles.
#[derive(Debug, Clone)]
pub struct TitleNormalizer {
    markers: Vec<String>,
    min_offset: usize,
}

impl Default for TitleNormalizer {
    fn default() -> Self {
        Self::from_config(&FiltersConfig::default())
    }
}

impl TitleNormalizer {
    pub fn new(markers: Vec<String>, min_offset: usize) -> Self {
        Self {
            markers: markers.into_iter().filter(|m| !m.is_empty()).collect(),
            min_offset,
        }
    }

    pub fn from_config(config: &FiltersConfig) -> Self {
        Self::new(config.title_markers.clone(), config.title_min_offset)
    }

    /// Clean a raw title.
    ///
    /// For each marker in order, truncate at its first occurrence that starts
    /// at least `min_offset` characters in. Short prefixes such as
    /// `"Live - ..."` are left alone. Surrounding whitespace is trimmed last.
    pub fn normalize(&self, raw: &str) -> String {
        let mut title = raw;
        for marker in &self.markers {
            let cut = title
                .match_indices(marker.as_str())
                .map(|(idx, _)| idx)
                .find(|&idx| title[..idx].chars().count() >= self.min_offset);
            if let Some(idx) = cut {
                title = &title[..idx];
            }
        }
        title.trim().to_string()
    }
}

/// Clean a title with the default markers and offset.
pub fn normalize(raw: &str) -> String {
    TitleNormalizer::default().normalize(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_outlet_suffix() {
        assert_eq!(
            normalize("Gaza ceasefire deal reached – Reuters"),
            "Gaza ceasefire deal reached"
        );
        assert_eq!(
            normalize("Markets slide on rate fears | AP News"),
            "Markets slide on rate fears"
        );
        assert_eq!(
            normalize("Bird flu found in dairy herds - The Guardian"),
            "Bird flu found in dairy herds"
        );
    }

    #[test]
    fn keeps_markers_near_the_start() {
        // " - " starts at character 4, before the minimum offset.
        assert_eq!(
            normalize("Live - election results as they come in"),
            "Live - election results as they come in"
        );
    }

    #[test]
    fn cuts_at_first_eligible_occurrence() {
        assert_eq!(
            normalize("Short - one headline here - part two - Outlet"),
            "Short - one headline here"
        );
    }

    #[test]
    fn applies_markers_in_order() {
        assert_eq!(
            normalize("Storm reaches the coast tonight | Live – BBC"),
            "Storm reaches the coast tonight"
        );
    }

    #[test]
    fn trims_and_handles_empty() {
        assert_eq!(normalize("   padded headline   "), "padded headline");
        assert_eq!(normalize(""), "");
    }

    #[test]
    fn offsets_count_characters_not_bytes() {
        // 14 multi-byte characters then the marker: offset 14 < 15, kept.
        let title = "ÄÖÜäöüßÄÖÜäöüß - tail";
        assert_eq!(normalize(title), title);
        // 15 characters: trimmed.
        assert_eq!(normalize("ÄÖÜäöüßÄÖÜäöüßé - tail"), "ÄÖÜäöüßÄÖÜäöüßé");
    }

    #[test]
    fn normalize_is_idempotent() {
        for raw in [
            "Gaza ceasefire deal reached – Reuters",
            "  Headline with trailing space -  ",
            "Short - one headline here - part two - Outlet",
            "A | B | C | D | E | F | G | H | I",
            "plain",
        ] {
            let once = normalize(raw);
            assert_eq!(normalize(&once), once, "not idempotent for {raw:?}");
        }
    }

    #[test]
    fn custom_markers() {
        let n = TitleNormalizer::new(vec![" :: ".into(), String::new()], 5);
        assert_eq!(n.normalize("Something happened :: Site"), "Something happened");
    }
}
