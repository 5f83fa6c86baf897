use serde::Serialize;

/// Longest warning text kept per distinct warning.
pub const MAX_WARNING_LEN: usize = 100;

/// Auxiliary statistics scraped from the transformer's console output.
///
/// These are best-effort: a line that matches no known marker is ignored, and
/// a marker with an unparseable value leaves its field untouched. Nothing here
/// feeds into the pass/fail classification, which is decided from the bytes on
/// disk by [`crate::oracle::classify`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TransformerStats {
    /// Size the transformer reported for its input.
    pub original_size: u64,
    /// Size the transformer reported for its output.
    pub modified_size: u64,
    pub instructions_disassembled: u64,
    /// Number of trace lines flagged `has_null=1`.
    pub flagged_instructions: u64,
    /// Strategy names in first-seen order, without repeats.
    pub strategies_applied: Vec<String>,
    /// Warning texts in first-seen order, without repeats, each clipped to
    /// [`MAX_WARNING_LEN`] characters.
    pub warnings: Vec<String>,
    /// Whether any line mentioned eliminating or transforming something.
    pub reports_elimination: bool,
}

/// Which captured stream a marker is looked for in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Stream {
    Stdout,
    Stderr,
}

/// One line-oriented parsing rule.
///
/// A line is handed to `apply` when it contains `marker` (compared
/// case-insensitively when `ignore_case` is set). Several rules may fire on
/// the same line.
struct MarkerRule {
    stream: Stream,
    marker: &'static str,
    ignore_case: bool,
    apply: fn(&str, &mut TransformerStats),
}

impl MarkerRule {
    const fn exact(
        stream: Stream,
        marker: &'static str,
        apply: fn(&str, &mut TransformerStats),
    ) -> Self {
        Self {
            stream,
            marker,
            ignore_case: false,
            apply,
        }
    }

    fn matches(&self, line: &str, lowered: &str) -> bool {
        if self.ignore_case {
            lowered.contains(self.marker)
        } else {
            line.contains(self.marker)
        }
    }
}

const MARKER_RULES: &[MarkerRule] = &[
    MarkerRule::exact(Stream::Stdout, "Original shellcode size:", apply_original_size),
    MarkerRule::exact(Stream::Stdout, "Modified shellcode size:", apply_modified_size),
    MarkerRule::exact(Stream::Stderr, "[DISASM] Disassembled", apply_disassembled),
    MarkerRule::exact(Stream::Stderr, "[TRACE] Using strategy", apply_strategy),
    MarkerRule::exact(Stream::Stderr, "[WARNING]", apply_warning),
    MarkerRule::exact(Stream::Stderr, "has_null=1", apply_flagged),
    MarkerRule {
        stream: Stream::Stderr,
        marker: "eliminated",
        ignore_case: true,
        apply: apply_elimination,
    },
    MarkerRule {
        stream: Stream::Stderr,
        marker: "transformed",
        ignore_case: true,
        apply: apply_elimination,
    },
];

/// Integer between the first and second colon, as in `Original shellcode size: 42`.
fn value_after_colon(line: &str) -> Option<u64> {
    line.split(':').nth(1)?.trim().parse().ok()
}

fn apply_original_size(line: &str, stats: &mut TransformerStats) {
    if let Some(size) = value_after_colon(line) {
        stats.original_size = size;
    }
}

fn apply_modified_size(line: &str, stats: &mut TransformerStats) {
    if let Some(size) = value_after_colon(line) {
        stats.modified_size = size;
    }
}

fn apply_disassembled(line: &str, stats: &mut TransformerStats) {
    let count = line
        .split_whitespace()
        .skip_while(|token| *token != "Disassembled")
        .nth(1)
        .and_then(|token| token.parse().ok());
    if let Some(count) = count {
        stats.instructions_disassembled = count;
    }
}

fn apply_strategy(line: &str, stats: &mut TransformerStats) {
    if let Some(name) = line.split('\'').nth(1) {
        push_unique(&mut stats.strategies_applied, name.to_string());
    }
}

fn apply_warning(line: &str, stats: &mut TransformerStats) {
    if let Some(text) = line.split("[WARNING]").nth(1) {
        let clipped: String = text.trim().chars().take(MAX_WARNING_LEN).collect();
        push_unique(&mut stats.warnings, clipped);
    }
}

fn apply_flagged(_line: &str, stats: &mut TransformerStats) {
    stats.flagged_instructions += 1;
}

fn apply_elimination(_line: &str, stats: &mut TransformerStats) {
    stats.reports_elimination = true;
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

/// Runs every marker rule over the captured streams of one transformer run.
pub fn observe(stdout: &str, stderr: &str) -> TransformerStats {
    let mut stats = TransformerStats::default();
    for (stream, text) in [(Stream::Stdout, stdout), (Stream::Stderr, stderr)] {
        for line in text.lines() {
            let lowered = line.to_lowercase();
            for rule in MARKER_RULES.iter().filter(|r| r.stream == stream) {
                if rule.matches(line, &lowered) {
                    (rule.apply)(line, &mut stats);
                }
            }
        }
    }
    stats
}
