//! The peephole optimization framework (spec.md §4.10): a small set of
//! line-window pattern/replacement rules applied to the assembled text
//! until no rule matches or a bound is hit. Grounded in the *framework*
//! shape of `examples/original_source/peephole.h`
//! (`load_rules`/`peephole`), but not its rule-file format: spec.md §9
//! flags that format as unspecified and unavailable (`i386.opt` is not
//! in the retrieved sources), so this defines its own small, documented
//! rule grammar instead of guessing at the original's (see DESIGN.md).
//!
//! A rule matches a fixed-size window of consecutive output lines
//! (ignoring leading/trailing whitespace) and replaces it with zero or
//! more lines. Placeholders (`$1`, `$2`, ...) in the pattern bind to
//! whatever text appears at that position and are substituted back into
//! the replacement, so e.g. `mov $1, $2` / `mov $2, $1` can recognize a
//! redundant self-move regardless of the operands involved.

use crate::common::Map;

/// A bound on passes over the text, so a rule set that (incorrectly)
/// never reaches a fixpoint cannot loop forever.
const MAX_PASSES: usize = 16;

#[derive(Clone, Debug)]
pub struct Rule {
    pattern: Vec<String>,
    replacement: Vec<String>,
}

impl Rule {
    pub fn new(pattern: Vec<&str>, replacement: Vec<&str>) -> Self {
        Rule {
            pattern: pattern.into_iter().map(str::to_string).collect(),
            replacement: replacement.into_iter().map(str::to_string).collect(),
        }
    }

    fn window_len(&self) -> usize {
        self.pattern.len()
    }

    /// Tries to match this rule's pattern against `window`, returning the
    /// placeholder bindings on success.
    fn matches<'a>(&self, window: &[&'a str]) -> Option<Map<u32, &'a str>> {
        if window.len() != self.pattern.len() {
            return None;
        }
        let mut bindings: Map<u32, &'a str> = Map::new();
        for (pat_line, actual) in self.pattern.iter().zip(window) {
            if !match_line(pat_line, actual.trim(), &mut bindings) {
                return None;
            }
        }
        Some(bindings)
    }

    fn expand(&self, bindings: &Map<u32, &str>) -> Vec<String> {
        self.replacement.iter().map(|line| substitute(line, bindings)).collect()
    }
}

/// Matches one pattern line, token by token, binding `$N` placeholders as
/// it goes and requiring any repeated placeholder to agree with its
/// earlier binding (so `mov $1, $2` / `mov $2, $1` only fires when `$1`
/// and `$2` are genuinely swapped, not for arbitrary four-token lines).
fn match_line<'a>(pattern: &str, actual: &'a str, bindings: &mut Map<u32, &'a str>) -> bool {
    let pat_tokens: Vec<&str> = pattern.split_whitespace().collect();
    let actual_tokens: Vec<&str> = actual.split_whitespace().collect();
    if pat_tokens.len() != actual_tokens.len() {
        return false;
    }
    for (p, a) in pat_tokens.iter().zip(&actual_tokens) {
        if let Some(n) = placeholder_index(p) {
            match bindings.get(&n) {
                Some(&bound) if bound != *a => return false,
                Some(_) => {}
                None => {
                    bindings.insert(n, a);
                }
            }
        } else if p != a {
            return false;
        }
    }
    true
}

fn placeholder_index(token: &str) -> Option<u32> {
    token.strip_prefix('$').and_then(|n| n.parse().ok())
}

fn substitute(line: &str, bindings: &Map<u32, &str>) -> String {
    let mut out = String::new();
    for (i, word) in line.split_whitespace().enumerate() {
        if i > 0 {
            out.push(' ');
        }
        match placeholder_index(word) {
            Some(n) => out.push_str(bindings.get(&n).copied().unwrap_or(word)),
            None => out.push_str(word),
        }
    }
    out
}

pub struct Rules {
    rules: Vec<Rule>,
}

impl Rules {
    pub fn new(rules: Vec<Rule>) -> Self {
        Rules { rules }
    }

    /// Applies every rule to `text`, repeating over the whole line
    /// sequence until a pass makes no change or `MAX_PASSES` is reached.
    pub fn apply(&self, text: &str) -> String {
        let mut lines: Vec<String> = text.lines().map(str::to_string).collect();
        for _ in 0..MAX_PASSES {
            let mut changed = false;
            let mut out: Vec<String> = Vec::with_capacity(lines.len());
            let mut i = 0;
            'outer: while i < lines.len() {
                for rule in &self.rules {
                    let w = rule.window_len();
                    if i + w > lines.len() {
                        continue;
                    }
                    let window: Vec<&str> = lines[i..i + w].iter().map(String::as_str).collect();
                    if let Some(bindings) = rule.matches(&window) {
                        out.extend(rule.expand(&bindings));
                        i += w;
                        changed = true;
                        continue 'outer;
                    }
                }
                out.push(lines[i].clone());
                i += 1;
            }
            lines = out;
            if !changed {
                break;
            }
        }
        let mut s = lines.join("\n");
        s.push('\n');
        s
    }
}

/// The rule set `jlc` ships with: a handful of obviously-redundant
/// instruction pairs, matching the kind of cleanup spec.md §4.10
/// describes (self-moves, back-to-back push/pop of the same operand,
/// an unconditional jump to the very next label).
pub fn default_rules() -> Rules {
    Rules::new(vec![
        Rule::new(vec!["mov $1, $1"], vec![]),
        Rule::new(vec!["push $1", "pop $1"], vec![]),
        Rule::new(vec!["mov $1, $2", "mov $2, $1"], vec!["mov $1, $2"]),
        Rule::new(vec!["jmp $1", "$1:"], vec!["$1:"]),
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drops_a_self_move() {
        let text = "mov eax, eax\nret 0\n";
        assert_eq!(default_rules().apply(text), "ret 0\n");
    }

    #[test]
    fn drops_a_push_immediately_popped() {
        let text = "push ebx\npop ebx\nret 0\n";
        assert_eq!(default_rules().apply(text), "ret 0\n");
    }

    #[test]
    fn collapses_a_redundant_reverse_move() {
        let text = "mov eax, ebx\nmov ebx, eax\nret 0\n";
        assert_eq!(default_rules().apply(text), "mov eax, ebx\nret 0\n");
    }

    #[test]
    fn drops_a_jump_to_the_immediately_following_label() {
        let text = "jmp b1\nb1:\nret 0\n";
        assert_eq!(default_rules().apply(text), "b1:\nret 0\n");
    }

    #[test]
    fn leaves_unrelated_code_untouched() {
        let text = "mov eax, ebx\nadd eax, 1\nret 0\n";
        assert_eq!(default_rules().apply(text), text);
    }
}
