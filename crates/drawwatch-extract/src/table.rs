//! Markup-table draw reconstruction.
//!
//! Structured sources render each draw as two table rows: a label row
//! carrying the draw's date and time, then a data row whose number groups
//! are icon sequences. Inside a group, a marker icon (say
//! `/img/pick3.png`) opens a game and the following digit icons
//! (`/img/number4.png`) fill it until the game's digit count is reached.
//!
//! ```text
//! <tr><td><span class="winning-date">Jan 7 2026 11:00 PM</span></td></tr>
//! <tr><td><ul class="number-list">
//!   <li><img src="/img/pick3.png"></li>
//!   <li><img src="/img/number4.png"></li> ...
//! </ul></td></tr>
//! ```
//!
//! A game that ends short of its digit count is dropped, never padded.

use chrono::{Datelike, NaiveDate};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Serialize};
use tracing::debug;

use drawwatch_core::{DrawRecord, Payload, TimeLabel};

use crate::tokenizer;
use crate::{DrawExtractor, ExtractError, Extraction};

/// Icon marker that opens a game inside a number group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameMarker {
    /// Case-insensitive substring of the icon attribute, e.g. `"pick3"`.
    pub marker: String,
    pub name: String,
    pub digits: usize,
}

impl GameMarker {
    pub fn new(marker: impl Into<String>, name: impl Into<String>, digits: usize) -> Self {
        Self {
            marker: marker.into(),
            name: name.into(),
            digits,
        }
    }
}

fn default_row_selector() -> String {
    "tr".into()
}

fn default_attribute() -> String {
    "src".into()
}

fn default_digit_pattern() -> String {
    r"number(\d)\.png".into()
}

/// Selector and icon conventions for one structured source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableLayout {
    #[serde(default = "default_row_selector")]
    pub row_selector: String,
    /// Element inside a label row holding the date/time text.
    pub label_selector: String,
    /// Number-group containers inside a data row.
    pub group_selector: String,
    /// Icon elements inside a number group.
    pub item_selector: String,
    #[serde(default = "default_attribute")]
    pub attribute: String,
    /// Regex with one capture group yielding a single digit.
    #[serde(default = "default_digit_pattern")]
    pub digit_pattern: String,
    pub games: Vec<GameMarker>,
}

/// Reconstructs draws from label-row/data-row table pairs.
#[derive(Debug, Clone)]
pub struct TableExtractor {
    layout: TableLayout,
    digit_re: Regex,
}

fn parse_selector(selector: &str) -> Result<Selector, ExtractError> {
    Selector::parse(selector).map_err(|e| ExtractError::Selector {
        selector: selector.to_string(),
        reason: format!("{e:?}"),
    })
}

impl TableExtractor {
    /// Validate the layout up front so a bad selector fails at startup
    /// rather than on every cycle.
    pub fn new(layout: TableLayout) -> Result<Self, ExtractError> {
        for selector in [
            &layout.row_selector,
            &layout.label_selector,
            &layout.group_selector,
            &layout.item_selector,
        ] {
            parse_selector(selector)?;
        }
        if layout.games.is_empty() {
            return Err(ExtractError::Config("table layout lists no games".into()));
        }
        if let Some(game) = layout.games.iter().find(|g| g.digits == 0 || g.marker.is_empty()) {
            return Err(ExtractError::Config(format!(
                "game {:?} needs a marker and a positive digit count",
                game.name
            )));
        }
        let digit_re = Regex::new(&layout.digit_pattern).map_err(|e| ExtractError::Pattern {
            pattern: layout.digit_pattern.clone(),
            reason: e.to_string(),
        })?;
        if digit_re.captures_len() < 2 {
            return Err(ExtractError::Pattern {
                pattern: layout.digit_pattern.clone(),
                reason: "needs one capture group".into(),
            });
        }
        Ok(Self { layout, digit_re })
    }

    fn game_for(&self, value: &str) -> Option<&GameMarker> {
        let lower = value.to_ascii_lowercase();
        self.layout
            .games
            .iter()
            .find(|g| lower.contains(&g.marker.to_ascii_lowercase()))
    }

    /// Walk one data row's number groups into a `{game: digits}` payload.
    fn row_payload(
        &self,
        row: ElementRef<'_>,
        group_sel: &Selector,
        item_sel: &Selector,
        short_games: &mut usize,
    ) -> Payload {
        let mut payload = Payload::new();
        for group in row.select(group_sel) {
            let mut open: Option<(&GameMarker, String)> = None;
            for item in group.select(item_sel) {
                let Some(value) = item.value().attr(&self.layout.attribute) else {
                    continue;
                };
                if let Some(game) = self.game_for(value) {
                    close_game(open.take(), &mut payload, short_games);
                    open = Some((game, String::new()));
                    continue;
                }
                let Some((game, digits)) = open.as_mut() else {
                    continue;
                };
                if digits.len() >= game.digits {
                    continue;
                }
                if let Some(d) = self.digit_re.captures(value).and_then(|c| c.get(1)) {
                    digits.push_str(d.as_str());
                }
            }
            close_game(open.take(), &mut payload, short_games);
        }
        payload
    }
}

fn close_game(open: Option<(&GameMarker, String)>, payload: &mut Payload, short_games: &mut usize) {
    let Some((game, digits)) = open else {
        return;
    };
    if digits.len() >= game.digits {
        payload.insert(game.name.clone(), digits);
    } else {
        *short_games += 1;
    }
}

fn compact_text(elem: ElementRef<'_>) -> String {
    elem.text()
        .collect::<Vec<_>>()
        .join(" ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

impl DrawExtractor for TableExtractor {
    fn extract_draws(
        &self,
        content: &str,
        reference_date: NaiveDate,
    ) -> Result<Extraction, ExtractError> {
        let row_sel = parse_selector(&self.layout.row_selector)?;
        let label_sel = parse_selector(&self.layout.label_selector)?;
        let group_sel = parse_selector(&self.layout.group_selector)?;
        let item_sel = parse_selector(&self.layout.item_selector)?;

        // AJAX endpoints return bare `<tr>` fragments; wrap them so the
        // parser keeps them as table rows.
        let document = if content.trim_start().starts_with("<tr") {
            Html::parse_fragment(&format!("<table>{content}</table>"))
        } else {
            Html::parse_document(content)
        };

        let rows: Vec<ElementRef<'_>> = document.select(&row_sel).collect();
        let mut out = Extraction::default();

        for (i, row) in rows.iter().enumerate() {
            let Some(label_el) = row.select(&label_sel).next() else {
                continue;
            };
            let label_text = compact_text(label_el);

            let label = tokenizer::find_time(&label_text).and_then(|t| TimeLabel::parse(t).ok());
            let Some(label) = label else {
                out.diagnostics.invalid_times += 1;
                continue;
            };
            // Label rows without a date belong to the day that was requested.
            let date = match tokenizer::find_date(&label_text) {
                Some(token) => match tokenizer::resolve_date(token, reference_date.year()) {
                    Some(date) => date,
                    None => {
                        out.diagnostics.invalid_dates += 1;
                        continue;
                    }
                },
                None => reference_date,
            };

            let Some(data_row) = rows.get(i + 1) else {
                out.diagnostics.times_without_payload += 1;
                continue;
            };
            let payload = self.row_payload(
                *data_row,
                &group_sel,
                &item_sel,
                &mut out.diagnostics.short_games,
            );
            if payload.is_empty() {
                out.diagnostics.times_without_payload += 1;
                continue;
            }

            let bucket = out.by_date.entry(date).or_default();
            if bucket.iter().any(|r| r.time == label) {
                out.diagnostics.duplicate_times += 1;
                continue;
            }
            bucket.push(DrawRecord::new(label, payload));
        }

        debug!(
            rows = rows.len(),
            draws = out.record_count(),
            "table scan finished"
        );
        Ok(out)
    }
}
