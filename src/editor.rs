use anyhow::{Context, Result};
use regex::Regex;
use serde::Serialize;
use std::path::Path;

use crate::recipe::{AnchorInjection, FunctionReplacement, Placement, Recipe};

/// A recorded injection step whose anchor was not found.
///
/// Misses are non-fatal: the transform proceeds and still succeeds, but the
/// caller gets to decide how loudly to report them.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct AnchorMiss {
    pub step: &'static str,
    pub anchor: &'static str,
}

/// Terminal outcome of applying a recipe to one document.
///
/// Never partial: either the full transformed content or nothing.
#[derive(Debug)]
pub enum TransformOutcome {
    Modified {
        content: String,
        message: String,
        anchor_misses: Vec<AnchorMiss>,
    },
    AlreadyProcessed {
        message: String,
    },
}

/// Per-file anchor/marker presence report, used by the `anchors` command to
/// make no-op vs. miss a visible decision before transforming.
#[derive(Debug, Serialize)]
pub struct AnchorSurvey {
    pub methodology: crate::recipe::Methodology,
    pub marker_present: bool,
    pub anchors: Vec<AnchorPresence>,
}

#[derive(Debug, Serialize)]
pub struct AnchorPresence {
    pub step: &'static str,
    pub present: bool,
}

/// Text editor over one strategy source document.
///
/// The document is opaque text; no MQL5 parsing happens here. Every edit is
/// a literal or regex rewrite against the current content.
pub struct StrategyEditor {
    content: String,
    misses: Vec<AnchorMiss>,
}

impl StrategyEditor {
    pub fn new(content: &str) -> Self {
        Self {
            content: content.to_string(),
            misses: Vec::new(),
        }
    }

    pub fn contains_marker(&self, marker: &str) -> bool {
        self.content.contains(marker)
    }

    /// Apply the fixed list of literal warning fixes, each globally.
    pub fn normalize_warnings(&mut self, fixes: &[(&str, &str)]) {
        for (find, replace) in fixes {
            if self.content.contains(find) {
                self.content = self.content.replace(find, replace);
            }
        }
    }

    /// Swap the first region matching the replacement spec's regex for its
    /// replacement text. Returns false (and records a miss) on no match.
    pub fn replace_function(&mut self, spec: &FunctionReplacement) -> Result<bool> {
        let re = Regex::new(spec.pattern)
            .with_context(|| format!("Invalid function pattern for step '{}'", spec.step))?;

        match re.find(&self.content) {
            Some(m) => {
                let mut rewritten =
                    String::with_capacity(self.content.len() + spec.replacement.len());
                rewritten.push_str(&self.content[..m.start()]);
                rewritten.push_str(spec.replacement);
                rewritten.push_str(&self.content[m.end()..]);
                self.content = rewritten;
                Ok(true)
            }
            None => {
                self.misses.push(AnchorMiss {
                    step: spec.step,
                    anchor: spec.signature,
                });
                Ok(false)
            }
        }
    }

    /// Apply one anchor-relative injection. Returns false (and records a
    /// miss, unless the placement has an append fallback) when the anchor
    /// is absent.
    pub fn inject(&mut self, injection: &AnchorInjection) -> bool {
        match self.content.find(injection.anchor) {
            Some(idx) => {
                let line_start = self.content[..idx]
                    .rfind('\n')
                    .map(|i| i + 1)
                    .unwrap_or(0);
                let line_end = self.content[idx..]
                    .find('\n')
                    .map(|i| idx + i)
                    .unwrap_or(self.content.len());

                let indent_len = self.content[line_start..]
                    .find(|c: char| !c.is_whitespace() || c == '\n')
                    .unwrap_or(0);
                let indent = self.content[line_start..line_start + indent_len].to_string();
                let block = indent_lines(injection.block, &indent);

                match injection.placement {
                    Placement::Before | Placement::BeforeOrAppend => {
                        let insertion = format!("{}\n\n", block);
                        self.content.insert_str(line_start, &insertion);
                    }
                    Placement::ReplaceLine => {
                        self.content.replace_range(line_start..line_end, &block);
                    }
                }
                true
            }
            None => match injection.placement {
                Placement::BeforeOrAppend => {
                    // Fallback: append at the end of the document.
                    self.content.push_str("\n\n");
                    self.content.push_str(injection.block);
                    self.content.push('\n');
                    true
                }
                _ => {
                    self.misses.push(AnchorMiss {
                        step: injection.step,
                        anchor: injection.anchor,
                    });
                    false
                }
            },
        }
    }

    pub fn into_parts(self) -> (String, Vec<AnchorMiss>) {
        (self.content, self.misses)
    }
}

/// Prefix every non-empty line of a flush-left block with the given
/// indentation, so the block aligns with its call site.
fn indent_lines(block: &str, indent: &str) -> String {
    if indent.is_empty() {
        return block.to_string();
    }
    block
        .lines()
        .map(|line| {
            if line.is_empty() {
                String::new()
            } else {
                format!("{}{}", indent, line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Read one strategy file as UTF-8 text.
///
/// A file that cannot be decoded is reported against its path; callers
/// batching over many files treat the error as per-file and keep going.
pub fn read_strategy(path: &Path) -> Result<String> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    String::from_utf8(bytes).map_err(|_| anyhow::anyhow!("{} is not valid UTF-8", path.display()))
}

/// Run a methodology's full recipe against one document.
///
/// Strictly linear: guard, warning normalization, optional function swap,
/// then each injection in order. Individual misses never halt the chain;
/// only the guard short-circuits.
pub fn apply_recipe(content: &str, filename: &str, recipe: &Recipe) -> Result<TransformOutcome> {
    let mut editor = StrategyEditor::new(content);
    if editor.contains_marker(recipe.marker) {
        return Ok(TransformOutcome::AlreadyProcessed {
            message: format!(
                "'{}' already carries the {} risk management block",
                filename, recipe.methodology
            ),
        });
    }

    editor.normalize_warnings(recipe.warning_fixes);

    if let Some(spec) = &recipe.function_replacement {
        editor.replace_function(spec)?;
    }

    for injection in &recipe.injections {
        editor.inject(injection);
    }

    let (content, anchor_misses) = editor.into_parts();
    Ok(TransformOutcome::Modified {
        content,
        message: format!("'{}': {}", filename, recipe.success_message),
        anchor_misses,
    })
}

/// Check which anchors and marker a document contains, without modifying it.
pub fn survey(content: &str, recipe: &Recipe) -> Result<AnchorSurvey> {
    let mut anchors: Vec<AnchorPresence> = recipe
        .injections
        .iter()
        .map(|injection| AnchorPresence {
            step: injection.step,
            present: content.contains(injection.anchor),
        })
        .collect();

    if let Some(spec) = &recipe.function_replacement {
        let re = Regex::new(spec.pattern)
            .with_context(|| format!("Invalid function pattern for step '{}'", spec.step))?;
        anchors.push(AnchorPresence {
            step: spec.step,
            present: re.is_match(content),
        });
    }

    Ok(AnchorSurvey {
        methodology: recipe.methodology,
        marker_present: content.contains(recipe.marker),
        anchors,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recipe::Placement;

    fn injection(
        anchor: &'static str,
        block: &'static str,
        placement: Placement,
    ) -> AnchorInjection {
        AnchorInjection {
            step: "test step",
            anchor,
            block,
            placement,
        }
    }

    #[test]
    fn test_inject_before_keeps_anchor_line() {
        let mut editor = StrategyEditor::new("alpha\ntarget line\nomega\n");
        let changed = editor.inject(&injection("target line", "injected", Placement::Before));
        assert!(changed);
        let (content, misses) = editor.into_parts();
        assert_eq!(content, "alpha\ninjected\n\ntarget line\nomega\n");
        assert!(misses.is_empty());
    }

    #[test]
    fn test_inject_applies_anchor_indentation() {
        let mut editor = StrategyEditor::new("fn() {\n    target line\n}\n");
        editor.inject(&injection(
            "target line",
            "first\n\nsecond",
            Placement::Before,
        ));
        let (content, _) = editor.into_parts();
        assert_eq!(
            content,
            "fn() {\n    first\n\n    second\n\n    target line\n}\n"
        );
    }

    #[test]
    fn test_inject_replace_line_removes_anchor() {
        let mut editor = StrategyEditor::new("head\n   size = old();\ntail\n");
        editor.inject(&injection(
            "size = old();",
            "size = new();",
            Placement::ReplaceLine,
        ));
        let (content, _) = editor.into_parts();
        assert_eq!(content, "head\n   size = new();\ntail\n");
        assert!(!content.contains("size = old();"));
    }

    #[test]
    fn test_inject_missing_anchor_records_miss() {
        let mut editor = StrategyEditor::new("nothing to see\n");
        let changed = editor.inject(&injection("absent", "block", Placement::Before));
        assert!(!changed);
        let (content, misses) = editor.into_parts();
        assert_eq!(content, "nothing to see\n");
        assert_eq!(misses.len(), 1);
        assert_eq!(misses[0].anchor, "absent");
    }

    #[test]
    fn test_inject_before_or_append_falls_back_to_append() {
        let mut editor = StrategyEditor::new("body\n");
        let changed = editor.inject(&injection("absent", "handler", Placement::BeforeOrAppend));
        assert!(changed);
        let (content, misses) = editor.into_parts();
        assert_eq!(content, "body\n\n\nhandler\n");
        assert!(misses.is_empty());
    }

    #[test]
    fn test_inject_uses_first_occurrence_only() {
        let mut editor = StrategyEditor::new("marker\nmiddle\nmarker\n");
        editor.inject(&injection("marker", "above", Placement::Before));
        let (content, _) = editor.into_parts();
        assert_eq!(content, "above\n\nmarker\nmiddle\nmarker\n");
    }

    #[test]
    fn test_normalize_warnings_is_idempotent() {
        let source = r#"x = 0.5f; return("File not found in the MQL5\Files directory to send on FTP server");"#;
        let mut editor = StrategyEditor::new(source);
        editor.normalize_warnings(crate::recipe::WARNING_FIXES);
        let (once, _) = editor.into_parts();

        let mut editor = StrategyEditor::new(&once);
        editor.normalize_warnings(crate::recipe::WARNING_FIXES);
        let (twice, _) = editor.into_parts();

        assert!(once.contains("0.5;"));
        assert!(once.contains(r"MQL5\\Files"));
        assert_eq!(once, twice);
    }

    #[test]
    fn test_normalize_warnings_order_independent() {
        let source = "a = 10.0f; b = 0.5f;";
        let mut forward = StrategyEditor::new(source);
        forward.normalize_warnings(crate::recipe::WARNING_FIXES);

        let reversed: Vec<(&str, &str)> = crate::recipe::WARNING_FIXES
            .iter()
            .rev()
            .copied()
            .collect();
        let mut backward = StrategyEditor::new(source);
        backward.normalize_warnings(&reversed);

        assert_eq!(forward.into_parts().0, backward.into_parts().0);
    }

    #[test]
    fn test_replace_function_swaps_whole_body() {
        let source = "before\ndouble sqMMFixedAmount(string symbol, int x)\n{\n    old();\n}\nafter\n";
        let spec = FunctionReplacement {
            step: "sqMMFixedAmount body",
            signature: "double sqMMFixedAmount(string symbol,",
            pattern: r"(?sm)double sqMMFixedAmount\(string symbol,.*?\)\s*\{.*?^\}",
            replacement: "double sqMMFixedAmount(string symbol, int x)\n{\nnew();\n}",
        };
        let mut editor = StrategyEditor::new(source);
        assert!(editor.replace_function(&spec).unwrap());
        let (content, _) = editor.into_parts();
        assert!(content.contains("new();"));
        assert!(!content.contains("old();"));
        assert!(content.starts_with("before\n"));
        assert!(content.ends_with("after\n"));
    }

    #[test]
    fn test_replace_function_does_not_cross_into_next_function() {
        let source = "double sqMMFixedAmount(string symbol, int x)\n{\n    old();\n}\n\nvoid OnTick()\n{\n    keep();\n}\n";
        let spec = FunctionReplacement {
            step: "sqMMFixedAmount body",
            signature: "double sqMMFixedAmount(string symbol,",
            pattern: r"(?sm)double sqMMFixedAmount\(string symbol,.*?\)\s*\{.*?^\}",
            replacement: "replaced",
        };
        let mut editor = StrategyEditor::new(source);
        editor.replace_function(&spec).unwrap();
        let (content, _) = editor.into_parts();
        assert!(content.contains("void OnTick()"));
        assert!(content.contains("keep();"));
    }

    #[test]
    fn test_replace_function_missing_records_miss() {
        let spec = FunctionReplacement {
            step: "sqMMFixedAmount body",
            signature: "double sqMMFixedAmount(string symbol,",
            pattern: r"(?sm)double sqMMFixedAmount\(string symbol,.*?\)\s*\{.*?^\}",
            replacement: "replaced",
        };
        let mut editor = StrategyEditor::new("no such function\n");
        assert!(!editor.replace_function(&spec).unwrap());
        let (_, misses) = editor.into_parts();
        assert_eq!(misses.len(), 1);
        assert_eq!(misses[0].step, "sqMMFixedAmount body");
    }
}
