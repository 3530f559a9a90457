use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use std::str::FromStr;

use crate::catalog::product::LocalizedText;

/// UI languages the storefront ships.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    Ja,
    En,
    Zh,
}

impl Language {
    pub fn as_str(self) -> &'static str {
        match self {
            Language::Ja => "ja",
            Language::En => "en",
            Language::Zh => "zh",
        }
    }
}

impl FromStr for Language {
    type Err = ();

    /// Accepts bare codes and BCP 47 tags (`en-US`, `zh-TW`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let primary = s.trim().split(['-', '_']).next().unwrap_or_default();
        match primary.to_ascii_lowercase().as_str() {
            "ja" => Ok(Language::Ja),
            "en" => Ok(Language::En),
            "zh" => Ok(Language::Zh),
            _ => Err(()),
        }
    }
}

/// Requested language, then English, then Japanese, then empty.
pub fn resolve_localized_text(text: &LocalizedText, language: Language) -> &str {
    let requested = match language {
        Language::Ja => Some(text.ja.as_str()),
        Language::En => text.en.as_deref(),
        Language::Zh => text.zh.as_deref(),
    };
    [requested, text.en.as_deref(), Some(text.ja.as_str())]
        .into_iter()
        .flatten()
        .find(|s| !s.is_empty())
        .unwrap_or("")
}

/// Yen amount without fraction digits, grouped by thousands.
pub fn format_price(price: f64, language: Language) -> String {
    let rounded = price.round() as i64;
    let digits = rounded.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    let symbol = match language {
        Language::Ja => "￥",
        Language::En | Language::Zh => "¥",
    };
    let sign = if rounded < 0 { "-" } else { "" };
    format!("{sign}{symbol}{grouped}")
}

fn jst() -> FixedOffset {
    FixedOffset::east_opt(9 * 3600).expect("+09:00 is a valid offset")
}

/// Calendar date in Japan for the given instant.
pub fn jst_date(now: DateTime<Utc>) -> NaiveDate {
    now.with_timezone(&jst()).date_naive()
}

fn parse_release_date(raw: &str) -> Option<NaiveDate> {
    let raw = raw.trim();
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y/%m/%d"))
        .ok()
        .or_else(|| {
            DateTime::parse_from_rfc3339(raw)
                .ok()
                .map(|dt| dt.with_timezone(&jst()).date_naive())
        })
}

/// True when the release date lies after `today` (a JST calendar date).
/// Missing or unparseable dates count as already released.
pub fn is_future_release_date(release_date: Option<&str>, today: NaiveDate) -> bool {
    release_date
        .and_then(parse_release_date)
        .is_some_and(|date| date > today)
}
