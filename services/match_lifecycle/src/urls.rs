//! Page URL and path construction for match pages.
//!
//! Two shapes are produced from the same [`SiteConfig`]:
//! - public URLs (`https://host[/locale]/section/match/id`) where the default
//!   locale carries no prefix; these go to the indexing service and are the
//!   dedup keys for kickoff submissions.
//! - rendering-tier paths (`/locale/section/...`), always locale-segmented,
//!   used for cache invalidation.

use regex::Regex;
use std::sync::OnceLock;

use crate::config::SiteConfig;

fn non_alphanumeric() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[^a-z0-9]+").expect("static regex"))
}

/// `"Congo DR"` -> `"congo-dr"`
pub fn slugify_team_name(team_name: &str) -> String {
    let lowered = team_name.trim().to_lowercase();
    non_alphanumeric()
        .replace_all(&lowered, "-")
        .trim_matches('-')
        .to_string()
}

/// `("Senegal", "Congo DR", "732152")` -> `"senegal-vs-congo-dr-732152"`
pub fn match_slug(home_team: &str, away_team: &str, match_id: &str) -> String {
    format!(
        "{}-vs-{}-{}",
        slugify_team_name(home_team),
        slugify_team_name(away_team),
        encode_segment(match_id)
    )
}

fn encode_segment(segment: &str) -> String {
    urlencoding::encode(segment).into_owned()
}

impl SiteConfig {
    fn locale_prefix(&self, locale: &str) -> String {
        if locale == self.default_locale {
            String::new()
        } else {
            format!("/{locale}")
        }
    }

    fn public_url(&self, locale: &str, path: &str) -> String {
        format!("{}{}{}", self.base_url, self.locale_prefix(locale), path)
    }

    /// `/section/match/<id>` without any locale segment.
    pub fn match_path(&self, match_id: &str) -> String {
        format!("/{}/match/{}", self.section, encode_segment(match_id))
    }

    pub fn prediction_path(&self, match_id: &str) -> String {
        format!("/{}/predictions/{}", self.section, encode_segment(match_id))
    }

    pub fn listing_path(&self) -> String {
        format!("/{}", self.section)
    }

    pub fn match_url(&self, match_id: &str, locale: &str) -> String {
        self.public_url(locale, &self.match_path(match_id))
    }

    /// The default-locale URL, used as the submission dedup key.
    pub fn canonical_match_url(&self, match_id: &str) -> String {
        self.match_url(match_id, &self.default_locale)
    }

    /// Every locale variant of the canonical match URL, default locale first
    /// as configured.
    pub fn match_urls(&self, match_id: &str) -> Vec<String> {
        self.locales
            .iter()
            .map(|locale| self.match_url(match_id, locale))
            .collect()
    }

    /// Team-name variant, e.g. `/en/can-2025/match/senegal-vs-congo-dr-732152`.
    pub fn seo_match_url(
        &self,
        home_team: &str,
        away_team: &str,
        match_id: &str,
        locale: &str,
    ) -> String {
        let path = format!(
            "/{}/match/{}",
            self.section,
            match_slug(home_team, away_team, match_id)
        );
        self.public_url(locale, &path)
    }

    /// Prefix shared by every canonical match URL.
    pub fn match_url_prefix(&self) -> String {
        format!("{}/{}/match/", self.base_url, self.section)
    }

    /// Rendering-tier variants of `path`, one per supported locale.
    pub fn localized_paths(&self, path: &str) -> Vec<String> {
        self.locales
            .iter()
            .map(|locale| {
                if path == "/" {
                    format!("/{locale}")
                } else {
                    format!("/{locale}{path}")
                }
            })
            .collect()
    }
}
