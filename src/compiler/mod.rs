//! nanoMIDI notation compiler - parses notation text into playback events
//!
//! Input is processed line by line. Lines starting with `@` are meta directives
//! that adjust the [`EngineConfig`]; everything else is note text:
//!
//! ```text
//! @bpm 96
//! @fit 30s
//! asdf [ace]-- || g-h
//! ```

pub mod event;
pub mod tempo;

pub use event::{merge_rests, total_units, Event};
pub use tempo::EngineConfig;

use tracing::{debug, warn};

/// Notation compiler state
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    config: EngineConfig,
}

impl Compiler {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn into_config(self) -> EngineConfig {
        self.config
    }

    /// Compile notation text, applying any directives to the compiler's config.
    ///
    /// Never fails: malformed directives are ignored and unknown characters skipped.
    pub fn compile(&mut self, text: &str) -> Vec<Event> {
        let (note_text, fit_seconds) = self.read_input(text);

        if let Some(seconds) = fit_seconds {
            let units = total_units(&self.tokenize(&note_text));
            if self.config.fit_units(units, seconds) {
                debug!(
                    "@fit {}s over {} units -> {} bpm",
                    seconds,
                    units,
                    self.config.tempo_bpm()
                );
            } else {
                warn!("@fit {}s ignored: nothing to fit", seconds);
            }
        }

        let events = self.tokenize(&note_text);
        debug!(
            "Compiled {} events ({} units) at {} bpm, unit 1/{}",
            events.len(),
            total_units(&events),
            self.config.tempo_bpm(),
            self.config.note_unit_denominator()
        );
        events
    }

    /// Split the input into directives and note text.
    ///
    /// Applies every directive except `@fit`, whose target (in seconds) is returned
    /// so it can be resolved against the final note text.
    fn read_input(&mut self, text: &str) -> (String, Option<f64>) {
        let mut note_lines: Vec<&str> = Vec::new();
        let mut fit_seconds = None;

        for line in text.split(is_line_break) {
            let trimmed = line.trim();
            match trimmed.strip_prefix('@') {
                Some(directive) => {
                    if let Some(seconds) = self.parse_directive(directive) {
                        fit_seconds = Some(seconds);
                    }
                }
                None => note_lines.push(line),
            }
        }

        (note_lines.join("\n"), fit_seconds)
    }

    /// Apply a directive (`@` already stripped). Returns the `@fit` target, if any.
    fn parse_directive(&mut self, directive: &str) -> Option<f64> {
        let mut parts = directive.splitn(2, |c: char| c.is_whitespace());
        let command = parts.next().unwrap_or("").to_ascii_lowercase();
        let param = parts.next().unwrap_or("").trim();

        match command.as_str() {
            "bpm" => match param.parse::<f64>() {
                Ok(bpm) if bpm.is_finite() && bpm > 0.0 => self.config.set_tempo_bpm(bpm),
                _ => warn!("Ignoring @bpm with value '{}'", param),
            },
            "unit" => match param.parse::<u32>() {
                Ok(unit) if unit > 0 => self.config.set_note_unit_denominator(unit),
                _ => warn!("Ignoring @unit with value '{}'", param),
            },
            "hold" => match param.parse::<f64>() {
                Ok(hold) if !hold.is_nan() => self.config.set_hold_fraction(hold),
                _ => warn!("Ignoring @hold with value '{}'", param),
            },
            "spacerest" => match parse_switch(param) {
                Some(on) => self.config.set_treat_space_as_rest(on),
                None => warn!("Ignoring @spacerest with value '{}'", param),
            },
            "fit" => match parse_fit_seconds(param) {
                Some(seconds) => return Some(seconds),
                None => warn!("Ignoring @fit with value '{}'", param),
            },
            _ => {
                // Unknown directive, ignore
            }
        }

        None
    }

    /// Turn note text into events.
    fn tokenize(&self, text: &str) -> Vec<Event> {
        let keep_spaces = self.config.treat_space_as_rest();
        let chars: Vec<char> = text
            .chars()
            .filter(|&c| !is_line_break(c))
            .filter(|&c| keep_spaces || !c.is_whitespace())
            .collect();

        let mut events = Vec::new();
        let mut pos = 0;

        while pos < chars.len() {
            let c = chars[pos];
            pos += 1;

            match c {
                '[' => {
                    let mut keys = Vec::new();
                    while pos < chars.len() && chars[pos] != ']' {
                        if !chars[pos].is_whitespace() {
                            keys.push(chars[pos]);
                        }
                        pos += 1;
                    }
                    // Closing bracket (absent if the chord runs to the end)
                    if pos < chars.len() {
                        pos += 1;
                    }
                    let ties = count_ties(&chars, &mut pos);
                    if let Some(chord) = Event::chord(keys, ties.saturating_add(1)) {
                        events.push(chord);
                    }
                }
                '|' => {
                    let mut count = 1u32;
                    while pos < chars.len() && chars[pos] == '|' {
                        count += 1;
                        pos += 1;
                    }
                    let units = count.saturating_mul(self.config.rest_weight_pipe()).max(1);
                    events.push(Event::rest(units));
                }
                c if is_key(c) => {
                    let ties = count_ties(&chars, &mut pos);
                    events.push(Event::press(c, ties.saturating_add(1)));
                }
                _ => {
                    // Inert character
                }
            }
        }

        merge_rests(events)
    }
}

/// Compile `text` starting from `config`, returning the events and the updated config.
pub fn compile(text: &str, config: &EngineConfig) -> (Vec<Event>, EngineConfig) {
    let mut compiler = Compiler::new(config.clone());
    let events = compiler.compile(text);
    (events, compiler.into_config())
}

/// Consume a run of `-` ties starting at `pos`.
fn count_ties(chars: &[char], pos: &mut usize) -> u32 {
    let mut ties = 0u32;
    while *pos < chars.len() && chars[*pos] == '-' {
        ties = ties.saturating_add(1);
        *pos += 1;
    }
    ties
}

/// Letters and digits from any script, plus ASCII punctuation and symbols
/// (`!` through `~`). Non-ASCII punctuation such as `¡` or `。` is inert.
fn is_key(c: char) -> bool {
    c.is_alphanumeric() || c.is_ascii_punctuation()
}

fn is_line_break(c: char) -> bool {
    matches!(
        c,
        '\n' | '\r' | '\u{0B}' | '\u{0C}' | '\u{85}' | '\u{2028}' | '\u{2029}'
    )
}

fn parse_switch(value: &str) -> Option<bool> {
    match value.to_ascii_lowercase().as_str() {
        "on" | "true" | "1" => Some(true),
        "off" | "false" | "0" => Some(false),
        _ => None,
    }
}

/// Parse `<number>[unit]` into seconds, e.g. `90`, `45s`, `1.5 min`.
fn parse_fit_seconds(value: &str) -> Option<f64> {
    let value = value.trim();
    let split = value
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(value.len());
    let (number, suffix) = value.split_at(split);
    let number: f64 = number.parse().ok()?;

    let scale = match suffix.trim().to_ascii_lowercase().as_str() {
        "" | "s" | "sec" | "secs" | "second" | "seconds" => 1.0,
        "m" | "min" | "mins" | "minute" | "minutes" => 60.0,
        _ => return None,
    };

    Some(number * scale)
}
