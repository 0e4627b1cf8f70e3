//! Textual command parser.
//!
//! Line-oriented grammar, case-insensitive keywords:
//!
//! ```text
//! HELP
//! DEFINE <name> = <command-body>
//! APPLY <name>
//! CUSTOM <op_id> { key: value, ... }
//! EXEC { <expr> }
//! REPEAT <n> { <op> [| <op> ...] }
//! IF <metric> (>|<|>=|<=|==|!=) <number> THEN <body> [ELSE <body>]
//! <op> [mask_or_value] [count] [direction] [ [start:end] ]
//! <op1> | <op2> | ...
//! ```
//!
//! The parser never fails: anything it cannot make sense of becomes a
//! `Command::Noop` carrying the raw input.

use crate::{BitRange, Command, Comparator, Condition, OpInvocation, Params};

pub fn parse(text: &str) -> Command {
    let line = text.trim();
    if line.is_empty() || line.starts_with('#') {
        return Command::Noop {
            raw: line.to_string(),
        };
    }

    let keyword = line
        .split_whitespace()
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase();

    match keyword.as_str() {
        "HELP" => Command::Help,
        "DEFINE" => parse_define(line),
        "APPLY" => parse_apply(line),
        "CUSTOM" => parse_custom(line),
        "EXEC" => parse_braced(line, "EXEC")
            .map(|code| Command::Exec { code })
            .unwrap_or_else(|| noop(line)),
        "REPEAT" => parse_repeat(line),
        "IF" => parse_if(line),
        _ => {
            let mut ops = parse_operation_list(line);
            if ops.is_empty() {
                noop(line)
            } else if ops.len() == 1 && !line.contains('|') {
                Command::Op(ops.remove(0))
            } else {
                Command::Pipeline { ops }
            }
        }
    }
}

fn noop(line: &str) -> Command {
    Command::Noop {
        raw: line.to_string(),
    }
}

/// `DEFINE <name> = <body>`; the body is parsed recursively, so macros can
/// wrap pipelines, loops, conditionals, or other macro calls.
fn parse_define(line: &str) -> Command {
    let rest = &line[6..];
    let Some((name_part, body_part)) = rest.split_once('=') else {
        return noop(line);
    };
    let name = name_part.trim();
    let body = body_part.trim();
    if !is_name(name) || body.is_empty() {
        return noop(line);
    }
    Command::Define {
        name: name.to_ascii_lowercase(),
        body: Box::new(parse(body)),
    }
}

fn parse_apply(line: &str) -> Command {
    let name = line[5..].trim();
    if !is_name(name) {
        return noop(line);
    }
    Command::Apply {
        name: name.to_ascii_lowercase(),
    }
}

/// `CUSTOM <id> { key: value, ... }` desugars to a plain operation with the
/// braced parameters; the id is resolved against the registry (including
/// custom-registered operations) at execution time.
fn parse_custom(line: &str) -> Command {
    let rest = line[6..].trim();
    let Some(brace) = rest.find('{') else {
        return noop(line);
    };
    let id = rest[..brace].trim().to_ascii_lowercase();
    if !is_name(&id) {
        return noop(line);
    }
    let Some(body) = rest[brace..].strip_prefix('{').and_then(|s| s.strip_suffix('}')) else {
        return noop(line);
    };
    match parse_param_block(body) {
        Some(params) => Command::Op(OpInvocation { id, params }),
        None => noop(line),
    }
}

/// Parse `key: value, ...` leniently: bare keys, bare or quoted values.
fn parse_param_block(body: &str) -> Option<Params> {
    let mut params = Params::default();
    for pair in body.split(',') {
        let pair = pair.trim();
        if pair.is_empty() {
            continue;
        }
        let (key, value) = pair.split_once(':')?;
        let key = key.trim().trim_matches('"').to_ascii_lowercase();
        let value = value.trim().trim_matches('"');
        match key.as_str() {
            "mask" => params.mask = Some(value.to_string()),
            "value" => params.value = Some(value.to_string()),
            "count" => params.count = Some(value.parse().ok()?),
            "seed" => params.seed = Some(value.parse().ok()?),
            "position" => params.position = Some(value.parse().ok()?),
            "direction" => params.direction = Some(value.parse().ok()?),
            "start" => params.range.get_or_insert(BitRange { start: 0, end: 0 }).start = value.parse().ok()?,
            "end" => params.range.get_or_insert(BitRange { start: 0, end: 0 }).end = value.parse().ok()?,
            _ => return None,
        }
    }
    Some(params)
}

fn parse_repeat(line: &str) -> Command {
    let rest = line[6..].trim();
    let Some(brace) = rest.find('{') else {
        return noop(line);
    };
    let Ok(times) = rest[..brace].trim().parse::<u64>() else {
        return noop(line);
    };
    let Some(body) = rest[brace..].strip_prefix('{').and_then(|s| s.strip_suffix('}')) else {
        return noop(line);
    };
    let body = parse_operation_list(body);
    if body.is_empty() {
        return noop(line);
    }
    Command::Repeat { times, body }
}

fn parse_if(line: &str) -> Command {
    let rest = line[2..].trim();
    let upper = rest.to_ascii_uppercase();
    let Some(then_at) = upper.find(" THEN ") else {
        return noop(line);
    };
    let head = rest[..then_at].trim();
    let tail = rest[then_at + 6..].trim();

    let mut parts = head.split_whitespace();
    let (Some(metric), Some(cmp), Some(threshold), None) =
        (parts.next(), parts.next(), parts.next(), parts.next())
    else {
        return noop(line);
    };
    let Ok(comparator) = cmp.parse::<Comparator>() else {
        return noop(line);
    };
    let Ok(threshold) = threshold.parse::<f64>() else {
        return noop(line);
    };

    let tail_upper = tail.to_ascii_uppercase();
    let (then_text, else_text) = match tail_upper.find(" ELSE ") {
        Some(else_at) => (&tail[..else_at], tail[else_at + 6..].trim()),
        None => (tail, ""),
    };

    let then_body = parse_operation_list(then_text);
    if then_body.is_empty() {
        return noop(line);
    }
    let else_body = if else_text.is_empty() {
        Vec::new()
    } else {
        parse_operation_list(else_text)
    };

    Command::If {
        condition: Condition {
            metric: metric.to_ascii_lowercase(),
            comparator,
            threshold,
        },
        then_body,
        else_body,
    }
}

/// Split on `|` and parse each segment as a single operation. Segments that
/// do not start with a plausible operation name are dropped rather than
/// failing the whole line.
pub fn parse_operation_list(text: &str) -> Vec<OpInvocation> {
    text.split('|')
        .filter_map(|segment| parse_operation(segment.trim()))
        .collect()
}

/// `<op> [mask_or_value] [count] [direction] [ [start:end] ]`, tokens in any
/// order after the id. A `^[01]+$` token is recorded as *both* mask and
/// value; operation semantics decide which meaning applies. A bracketed
/// `[a:b]` token is always a range.
fn parse_operation(segment: &str) -> Option<OpInvocation> {
    let mut tokens = segment.split_whitespace();
    let id = tokens.next()?.to_ascii_lowercase();
    if !is_name(&id) {
        return None;
    }

    let mut params = Params::default();
    for token in tokens {
        if let Some(range) = parse_range_token(token) {
            params.range = Some(range);
        } else if !token.is_empty() && token.bytes().all(|b| b == b'0' || b == b'1') {
            // Ambiguous bit-string token: recorded as mask, value, and
            // (when it reads as a number) count. Operation semantics pick
            // the meaning; the parser does not.
            params.mask = Some(token.to_string());
            params.value = Some(token.to_string());
            if params.count.is_none()
                && let Ok(n) = token.parse::<u64>()
            {
                params.count = Some(n);
            }
        } else if let Ok(direction) = token.parse() {
            params.direction = Some(direction);
        } else if let Ok(n) = token.parse::<u64>() {
            params.count = Some(n);
        } else {
            // Informative garbage elsewhere in the line must not kill the
            // command; unknown tokens are skipped.
            continue;
        }
    }
    Some(OpInvocation { id, params })
}

fn parse_range_token(token: &str) -> Option<BitRange> {
    let inner = token.strip_prefix('[')?.strip_suffix(']')?;
    let (start, end) = inner.split_once(':')?;
    Some(BitRange {
        start: start.trim().parse().ok()?,
        end: end.trim().parse().ok()?,
    })
}

/// Extract the text between the first `{` after `keyword` and the matching
/// final `}`.
fn parse_braced(line: &str, keyword: &str) -> Option<String> {
    let rest = line[keyword.len()..].trim();
    let body = rest.strip_prefix('{')?.strip_suffix('}')?;
    Some(body.trim().to_string())
}

fn is_name(s: &str) -> bool {
    !s.is_empty()
        && s.chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Direction;

    #[test]
    fn parses_single_operation() {
        let Command::Op(op) = parse("NOT") else {
            panic!("expected op");
        };
        assert_eq!(op.id, "not");
        assert_eq!(op.params, Params::default());
    }

    #[test]
    fn parses_operation_with_mask_count_direction_range() {
        let Command::Op(op) = parse("xor 1010 [2:6] 3 decode") else {
            panic!("expected op");
        };
        assert_eq!(op.params.mask.as_deref(), Some("1010"));
        assert_eq!(op.params.value.as_deref(), Some("1010"));
        assert_eq!(op.params.count, Some(3));
        assert_eq!(op.params.direction, Some(Direction::Decode));
        assert_eq!(op.params.range, Some(BitRange { start: 2, end: 6 }));
    }

    #[test]
    fn bit_string_token_carries_every_reading() {
        // "10" could be a mask or a rotate amount; the parser records
        // both and the operation decides.
        let Command::Op(op) = parse("rol 10") else {
            panic!("expected op");
        };
        assert_eq!(op.params.count, Some(10));
        assert_eq!(op.params.mask.as_deref(), Some("10"));
    }

    #[test]
    fn parses_pipeline() {
        let Command::Pipeline { ops } = parse("not | rev | rol 2") else {
            panic!("expected pipeline");
        };
        assert_eq!(
            ops.iter().map(|o| o.id.as_str()).collect::<Vec<_>>(),
            ["not", "rev", "rol"]
        );
    }

    #[test]
    fn parses_repeat() {
        let Command::Repeat { times, body } = parse("REPEAT 4 { rol 1 }") else {
            panic!("expected repeat");
        };
        assert_eq!(times, 4);
        assert_eq!(body.len(), 1);
        assert_eq!(body[0].id, "rol");
    }

    #[test]
    fn parses_repeat_with_pipeline_body() {
        let Command::Repeat { body, .. } = parse("repeat 2 { xor 00001111 | not }") else {
            panic!("expected repeat");
        };
        assert_eq!(body.len(), 2);
    }

    #[test]
    fn parses_if_then_else() {
        let Command::If {
            condition,
            then_body,
            else_body,
        } = parse("IF entropy >= 0.5 THEN scramble ELSE not | rev")
        else {
            panic!("expected conditional");
        };
        assert_eq!(condition.metric, "entropy");
        assert_eq!(condition.comparator, Comparator::Ge);
        assert_eq!(condition.threshold, 0.5);
        assert_eq!(then_body.len(), 1);
        assert_eq!(else_body.len(), 2);
    }

    #[test]
    fn parses_define_and_apply() {
        let Command::Define { name, body } = parse("DEFINE flip = NOT") else {
            panic!("expected define");
        };
        assert_eq!(name, "flip");
        assert_eq!(*body, Command::Op(OpInvocation { id: "not".to_string(), params: Params::default() }));

        let Command::Apply { name } = parse("apply FLIP") else {
            panic!("expected apply");
        };
        assert_eq!(name, "flip");
    }

    #[test]
    fn parses_custom_block() {
        let Command::Op(op) = parse(r#"CUSTOM scramble { seed: 99, "count": 2 }"#) else {
            panic!("expected op");
        };
        assert_eq!(op.id, "scramble");
        assert_eq!(op.params.seed, Some(99));
        assert_eq!(op.params.count, Some(2));
    }

    #[test]
    fn parses_exec_block() {
        let Command::Exec { code } = parse("EXEC { xor(bits, not(bits)) }") else {
            panic!("expected exec");
        };
        assert_eq!(code, "xor(bits, not(bits))");
    }

    #[test]
    fn unparseable_input_degrades_to_noop() {
        for line in ["", "   ", "# comment", "REPEAT x { not }", "DEFINE = not", "!!!"] {
            assert!(
                matches!(parse(line), Command::Noop { .. }),
                "line {line:?} should be a no-op"
            );
        }
    }

    #[test]
    fn help_keyword_is_case_insensitive() {
        assert_eq!(parse("help"), Command::Help);
        assert_eq!(parse("HELP"), Command::Help);
    }
}
