//! The textual rewrite passes that run before a formula is tokenized.
//!
//! Each function below is one lettered step from SPEC_FULL.md §4.3. They
//! run in order; later steps generally operate only on what's left inside
//! `[bracketed]` placeholders, since earlier steps have already turned
//! every alias and constant reference into one.

use std::collections::BTreeMap;

use crate::expr::CompileError;
use crate::events::core::fixed_counter_translation;
use crate::events::constants::Constant;
use crate::metadata::{Granularity, Metadata};

fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Replace whole-word occurrences of `word` in `s` with `replacement`,
/// leaving occurrences that are part of a larger identifier untouched.
fn replace_whole_word(s: &str, word: &str, replacement: &str) -> String {
    if word.is_empty() {
        return s.to_string();
    }
    let chars: Vec<char> = s.chars().collect();
    let wchars: Vec<char> = word.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i..].len() >= wchars.len() && chars[i..i + wchars.len()] == wchars[..] {
            let before_ok = i == 0 || !is_ident_char(chars[i - 1]);
            let after = i + wchars.len();
            let after_ok = after >= chars.len() || !is_ident_char(chars[after]);
            if before_ok && after_ok {
                out.push_str(replacement);
                i = after;
                continue;
            }
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// Walk every `[...]` placeholder in `s`, calling `f` with its inner text.
/// `f` returns `Some(replacement)` to substitute the whole `[...]` span, or
/// `None` to leave it untouched.
fn rewrite_brackets(s: &str, mut f: impl FnMut(&str) -> Option<String>) -> String {
    let mut out = String::with_capacity(s.len());
    let mut rest = s;
    while let Some(open) = rest.find('[') {
        out.push_str(&rest[..open]);
        let after_open = &rest[open + 1..];
        match after_open.find(']') {
            Some(close) => {
                let inner = &after_open[..close];
                match f(inner) {
                    Some(replacement) => out.push_str(&replacement),
                    None => {
                        out.push('[');
                        out.push_str(inner);
                        out.push(']');
                    }
                }
                rest = &after_open[close + 1..];
            }
            None => {
                // Unbalanced bracket: copy the rest verbatim and stop.
                out.push('[');
                out.push_str(after_open);
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);
    out
}

/// Step (a): alias substitution. Each event's `Alias` (if any) and each
/// constant's alias is replaced, whole-word, with `[canonical_name]`.
pub fn substitute_aliases(s: &str, aliases: &BTreeMap<String, String>) -> String {
    let mut ordered: Vec<(&String, &String)> = aliases.iter().collect();
    ordered.sort_by_key(|(alias, _)| std::cmp::Reverse(alias.len()));
    let mut out = s.to_string();
    for (alias, canonical) in ordered {
        out = replace_whole_word(&out, alias, &format!("[{canonical}]"));
    }
    out
}

/// Step (b): time-constant substitution, applied before bracket-aware
/// passes because `DURATIONTIMEINSECONDS` appears bare in perfmon
/// formulas while `DURATIONTIMEINMILLISECONDS` appears bracketed.
pub fn substitute_time_constants(s: &str) -> String {
    let out = replace_whole_word(s, "DURATIONTIMEINSECONDS", "1");
    out.replace("[DURATIONTIMEINMILLISECONDS]", "1000")
}

/// Step (c): fixed-counter name translation. A bracketed catalog name that
/// names a fixed-purpose counter is rewritten to the tool-native event
/// name the pipeline's observations will actually use.
pub fn translate_fixed_counters(s: &str) -> String {
    rewrite_brackets(s, |inner| {
        fixed_counter_translation(inner).map(|native| format!("[{native}]"))
    })
}

/// Step (d): platform-constant substitution. A bracketed platform constant
/// (`[TSC]`, `[SOCKET_COUNT]`, ...) is replaced with its numeric or boolean
/// literal value for this platform and granularity.
pub fn substitute_platform_constants(
    s: &str,
    metadata: &Metadata,
    granularity: Granularity,
) -> String {
    rewrite_brackets(s, |inner| {
        let constant = Constant::from_name(inner)?;
        Some(platform_constant_literal(constant, metadata, granularity))
    })
}

fn platform_constant_literal(
    constant: Constant,
    metadata: &Metadata,
    granularity: Granularity,
) -> String {
    match constant {
        Constant::Tsc => match granularity {
            Granularity::System => metadata.tsc(),
            Granularity::Socket => metadata.tsc_per_socket(),
            Granularity::Cpu => metadata.tsc_per_cpu(),
        }
        .to_string(),
        Constant::SystemTscFreq => metadata.tsc_frequency_hz.to_string(),
        Constant::CoresPerSocket => metadata.cores_per_socket.to_string(),
        Constant::ChasPerSocket => {
            let total = metadata.uncore_device_count("cha") as u32;
            let per_socket = if metadata.sockets == 0 {
                0
            } else {
                total / metadata.sockets
            };
            per_socket.to_string()
        }
        Constant::SocketCount => metadata.sockets.to_string(),
        Constant::HyperthreadingOn => metadata.hyperthreading_on().to_string(),
        Constant::ConstThreadCount => metadata.threads_per_core.to_string(),
        Constant::Txn => metadata.transaction_rate.unwrap_or(0.0).to_string(),
        Constant::DurationTimeInSeconds => "1".to_string(),
        Constant::DurationTimeInMilliseconds => "1000".to_string(),
    }
}

/// Step (e): rewrite every Python-style conditional expression
/// (`expr1 if cond else expr2`) into a ternary (`cond ? expr1 : expr2`),
/// innermost first.
pub fn rewrite_conditionals(s: &str) -> Result<String, CompileError> {
    let mut current = s.to_string();
    while let Some(if_pos) = find_word(&current, "if") {
        let chars: Vec<char> = current.chars().collect();
        let expr1_start = scan_left_for_boundary(&chars, if_pos);
        let cond_start = if_pos + 2;
        let else_pos = find_word(&current[cond_start..], "else")
            .map(|p| p + cond_start)
            .ok_or_else(|| CompileError::UnbalancedConditional {
                formula: s.to_string(),
            })?;
        let expr2_start = else_pos + 4;
        let expr2_end = scan_right_for_boundary(&chars, expr2_start);

        let expr1 = wrap_if_needed(&current[expr1_start..if_pos]);
        let cond = wrap_if_needed(&current[cond_start..else_pos]);
        let expr2 = wrap_if_needed(&current[expr2_start..expr2_end]);

        let mut rewritten = String::new();
        rewritten.push_str(&current[..expr1_start]);
        rewritten.push_str(&cond);
        rewritten.push_str(" ? ");
        rewritten.push_str(&expr1);
        rewritten.push_str(" : ");
        rewritten.push_str(&expr2);
        rewritten.push_str(&current[expr2_end..]);
        current = rewritten;
    }
    Ok(current)
}

/// Find the byte offset of a standalone occurrence of `word` in `s`.
fn find_word(s: &str, word: &str) -> Option<usize> {
    let bytes = s.as_bytes();
    let wlen = word.len();
    let mut start = 0;
    while let Some(rel) = s[start..].find(word) {
        let pos = start + rel;
        let before_ok = pos == 0 || !is_ident_char(bytes[pos - 1] as char);
        let after = pos + wlen;
        let after_ok = after >= bytes.len() || !is_ident_char(bytes[after] as char);
        if before_ok && after_ok {
            return Some(pos);
        }
        start = pos + wlen;
    }
    None
}

/// Scan left from `char_pos` (a char index, exclusive) to find where the
/// enclosing expression began: the position at which parenthesis depth
/// would go negative, or the start of the string.
fn scan_left_for_boundary(chars: &[char], char_pos: usize) -> usize {
    let mut depth: i32 = 0;
    let mut i = char_pos;
    while i > 0 {
        let c = chars[i - 1];
        match c {
            ')' => depth += 1,
            '(' => {
                depth -= 1;
                if depth < 0 {
                    return i;
                }
            }
            _ => {}
        }
        i -= 1;
    }
    0
}

/// Scan right from `char_pos` to find where the enclosing expression ends.
fn scan_right_for_boundary(chars: &[char], char_pos: usize) -> usize {
    let mut depth: i32 = 0;
    let mut i = char_pos;
    while i < chars.len() {
        match chars[i] {
            '(' => depth += 1,
            ')' => {
                depth -= 1;
                if depth < 0 {
                    return i;
                }
            }
            _ => {}
        }
        i += 1;
    }
    chars.len()
}

fn contains_top_level(s: &str, needle: char) -> bool {
    let mut depth: i32 = 0;
    for c in s.chars() {
        match c {
            '(' | '[' => depth += 1,
            ')' | ']' => depth -= 1,
            c if depth == 0 && c == needle => return true,
            _ => {}
        }
    }
    false
}

/// Wrap a conditional-expression branch in parens only when it's itself a
/// (possibly already-rewritten) ternary, to avoid ambiguous nesting.
fn wrap_if_needed(segment: &str) -> String {
    let trimmed = segment.trim();
    if contains_top_level(trimmed, '?') || contains_top_level(trimmed, ':') {
        format!("({trimmed})")
    } else {
        trimmed.to_string()
    }
}

/// Step (f): comparator repair. Perfmon formulas sometimes carry a lexer
/// artifact of a space between a comparator and its `=`, and use single
/// `&`/`|` where a boolean `&&`/`||` was meant.
pub fn repair_comparators(s: &str) -> String {
    let mut out = s
        .replace("> =", ">=")
        .replace("< =", "<=")
        .replace("! =", "!=")
        .replace("= =", "==");
    out = promote_to_double(&out, '&');
    out = promote_to_double(&out, '|');
    out
}

fn promote_to_double(s: &str, c: char) -> String {
    let chars: Vec<char> = s.chars().collect();
    let mut out = String::with_capacity(s.len());
    let mut i = 0;
    while i < chars.len() {
        if chars[i] == c {
            if i + 1 < chars.len() && chars[i + 1] == c {
                out.push(c);
                out.push(c);
                i += 2;
                continue;
            }
            out.push(c);
            out.push(c);
            i += 1;
            continue;
        }
        out.push(chars[i]);
        i += 1;
    }
    out
}

/// Step (g): numeric literal placeholders. A bracketed pure integer
/// (`[0]`, `[-1]`) is just unwrapped to a bare literal.
pub fn numeric_literal_placeholders(s: &str) -> String {
    rewrite_brackets(s, |inner| {
        let digits = inner.strip_prefix(['-', '+']).unwrap_or(inner);
        if !digits.is_empty() && digits.chars().all(|c| c.is_ascii_digit()) {
            Some(inner.to_string())
        } else {
            None
        }
    })
}

/// Step (h): off-core response event renaming. Collapses the MSR-value
/// suffix perfmon attaches to every OCR event into the pipeline's flat
/// naming convention.
pub fn rename_ocr_events(s: &str) -> String {
    rewrite_brackets(s, |inner| {
        let rest = inner.strip_prefix("OCR.")?;
        let (name, hex) = rest.split_once(":ocr_msr_val=")?;
        Some(format!("[{name}.{hex}]"))
    })
}

/// Step (i): uncore abbreviation. A bracketed uncore event's full catalog
/// name is replaced with its short `UniqueID`, matching what the group
/// packer emits as the observation's event-name field.
pub fn abbreviate_uncore(s: &str, unique_ids: &BTreeMap<String, String>) -> String {
    rewrite_brackets(s, |inner| unique_ids.get(inner).map(|id| format!("[{id}]")))
}

/// Step (j): variable discovery. Every `[...]` placeholder still present
/// after steps (a)-(i) names a variable the evaluator must resolve from an
/// observed frame; returns them in first-occurrence order.
pub fn discover_variables(s: &str) -> Vec<String> {
    let mut variables = Vec::new();
    rewrite_brackets(s, |inner| {
        if !variables.iter().any(|v: &String| v == inner) {
            variables.push(inner.to_string());
        }
        None
    });
    variables
}
