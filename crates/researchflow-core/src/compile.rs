//! Generator-written LaTeX, sanitized and compiled with an external program.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::generator::{GenerationOptions, TextGenerator};
use crate::text_utils::normalize_filename;
use crate::{CompiledArtifact, Config, CoreError, FormattingJob};

const DIAGNOSTIC_TAIL_LINES: usize = 40;
const EXEMPLAR_MAX_TOKENS: u32 = 2048;
const LATEX_MAX_TOKENS: u32 = 16384;

const PREAMBLE: &str = r"\documentclass[11pt]{article}
\usepackage[T1]{fontenc}
\usepackage[utf8]{inputenc}
\usepackage{lmodern}
\usepackage{textcomp}
\usepackage{amsmath}
\usepackage{amssymb}
\usepackage[margin=2.5cm]{geometry}
\usepackage{hyperref}
";

static DOCUMENT_BODY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\\begin\{document\}(.*?)(?:\\end\{document\}|\z)").unwrap());
static PREAMBLE_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?m)^[ \t]*\\(?:documentclass|usepackage|RequirePackage)\b.*(?:\r?\n|\z)")
        .unwrap()
});
static DOCUMENT_MARKER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\(?:begin|end)\{document\}").unwrap());
static FENCED_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n(.*?)```").unwrap());
static FENCE_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^[ \t]*```.*(?:\r?\n|\z)").unwrap());
static ENVIRONMENT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\\(begin|end)\s*\{([^}]+)\}").unwrap());

/// Turns a [`FormattingJob`] into `.tex` and `.pdf` files under the artifact
/// directory.
pub struct ArtifactCompiler {
    exemplar_generator: Arc<dyn TextGenerator>,
    latex_generator: Arc<dyn TextGenerator>,
    artifact_dir: PathBuf,
    program: String,
    args: Vec<String>,
    timeout: Duration,
}

impl ArtifactCompiler {
    /// `exemplar_generator` writes the short style example; `latex_generator`
    /// writes the full LaTeX body.
    pub fn new(
        exemplar_generator: Arc<dyn TextGenerator>,
        latex_generator: Arc<dyn TextGenerator>,
        config: &Config,
    ) -> Self {
        Self {
            exemplar_generator,
            latex_generator,
            artifact_dir: config.artifact_dir.clone(),
            program: config.compiler_program.clone(),
            args: config.compiler_args.clone(),
            timeout: config.compile_timeout(),
        }
    }

    /// Generate, sanitize and compile once.
    ///
    /// Returns `CompilationFailed` (carrying the `.tex` path and the compiler
    /// diagnostics) when no PDF was produced.
    pub async fn compile(&self, job: &FormattingJob) -> Result<CompiledArtifact, CoreError> {
        if job.source_text.trim().is_empty() {
            return Err(CoreError::InvalidInput("nothing to format".into()));
        }
        if job.style.trim().is_empty() {
            return Err(CoreError::InvalidInput("a target style is required".into()));
        }

        let exemplar = self.style_exemplar(&job.style).await;
        let prompt = latex_prompt(&job.source_text, &job.style, &exemplar);
        let options = GenerationOptions::default().with_max_output_tokens(LATEX_MAX_TOKENS);
        let raw = self.latex_generator.generate(&prompt, &options).await?;

        let body = sanitize_latex(&raw);
        if body.is_empty() {
            return Err(CoreError::InvalidModelOutput {
                message: "generator returned no LaTeX body".into(),
                excerpt: crate::text_utils::truncate_chars(&raw, 1000).to_string(),
            });
        }

        let findings = check_balance(&body);
        for finding in &findings {
            tracing::warn!(style = %job.style, finding = %finding, "unbalanced LaTeX environment");
        }

        let stem = format!("{}_formatted", normalize_filename(&job.base_filename));
        let run = self.run_compiler(&stem, &wrap_document(&body)).await?;

        let mut diagnostics = findings.join("\n");
        if !run.compiled && !run.log.is_empty() {
            if !diagnostics.is_empty() {
                diagnostics.push('\n');
            }
            diagnostics.push_str(&run.log);
        }

        let artifact = CompiledArtifact {
            tex_path: run.tex_path,
            pdf_path: run.pdf_path,
            compiled: run.compiled,
            diagnostics,
        };
        if artifact.compiled {
            tracing::info!(tex = %artifact.tex_path.display(), "compiled formatted document");
            Ok(artifact)
        } else {
            tracing::warn!(tex = %artifact.tex_path.display(), "LaTeX compilation failed");
            Err(CoreError::CompilationFailed(Box::new(artifact)))
        }
    }

    /// A short LaTeX example of `style`. Empty on any failure.
    async fn style_exemplar(&self, style: &str) -> String {
        let prompt = format!(
            "First, describe the {style} conference/journal style in a few words, focusing on \
             its rules and requirements.\n\
             Then, acting as a LaTeX formatting assistant, give a short example of LaTeX \
             formatted in the {style} style. Include an abstract, sections, subsections, lists \
             and emphasis as appropriate."
        );
        let options = GenerationOptions::default().with_max_output_tokens(EXEMPLAR_MAX_TOKENS);
        match self.exemplar_generator.generate(&prompt, &options).await {
            Ok(text) => text,
            Err(e) => {
                tracing::warn!(style = %style, error = %e, "style exemplar request failed, continuing without it");
                String::new()
            }
        }
    }

    /// Compile `source` inside a scratch directory, then move the results to
    /// `{artifact_dir}/{stem}.tex` and `{artifact_dir}/{stem}.pdf`.
    async fn run_compiler(&self, stem: &str, source: &str) -> Result<CompilerRun, CoreError> {
        tokio::fs::create_dir_all(&self.artifact_dir).await?;
        // Auxiliary files of concurrent jobs stay apart; removed on drop.
        let scratch = tempfile::Builder::new()
            .prefix(".job-")
            .tempdir_in(&self.artifact_dir)?;

        let tex_name = format!("{stem}.tex");
        let scratch_tex = scratch.path().join(&tex_name);
        let scratch_pdf = scratch.path().join(format!("{stem}.pdf"));
        tokio::fs::write(&scratch_tex, source).await?;

        let log = self.invoke(scratch.path(), &tex_name).await;
        let compiled = tokio::fs::try_exists(&scratch_pdf).await.unwrap_or(false);

        let tex_path = self.artifact_dir.join(&tex_name);
        let final_pdf = self.artifact_dir.join(format!("{stem}.pdf"));
        tokio::fs::rename(&scratch_tex, &tex_path).await?;

        let pdf_path = if compiled {
            tokio::fs::rename(&scratch_pdf, &final_pdf).await?;
            Some(final_pdf)
        } else {
            // A PDF left by an earlier job of the same name would be stale.
            match tokio::fs::remove_file(&final_pdf).await {
                Ok(()) => tracing::debug!(pdf = %final_pdf.display(), "removed stale PDF"),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
            None
        };

        Ok(CompilerRun {
            tex_path,
            pdf_path,
            compiled,
            log,
        })
    }

    /// Run the compiler once and describe how it went: exit status plus the
    /// tail of its output, or why it could not run.
    async fn invoke(&self, work_dir: &Path, tex_name: &str) -> String {
        let mut cmd = tokio::process::Command::new(&self.program);
        cmd.args(&self.args)
            .arg(tex_name)
            .current_dir(work_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(program = %self.program, file = %tex_name, "running LaTeX compiler");
        match tokio::time::timeout(self.timeout, cmd.output()).await {
            Err(_) => format!(
                "compiler `{}` timed out after {}s",
                self.program,
                self.timeout.as_secs()
            ),
            Ok(Err(e)) => format!("failed to start compiler `{}`: {e}", self.program),
            Ok(Ok(output)) => {
                let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
                combined.push_str(&String::from_utf8_lossy(&output.stderr));
                let tail = tail_lines(&combined, DIAGNOSTIC_TAIL_LINES);
                if tail.is_empty() {
                    format!("compiler exited with {}", output.status)
                } else {
                    format!("compiler exited with {}\n{tail}", output.status)
                }
            }
        }
    }
}

struct CompilerRun {
    tex_path: PathBuf,
    pdf_path: Option<PathBuf>,
    compiled: bool,
    log: String,
}

fn latex_prompt(source_text: &str, style: &str, exemplar: &str) -> String {
    let mut prompt = format!(
        "You are a LaTeX formatting assistant. Apply the {style} style to the text below.\n"
    );
    if !exemplar.trim().is_empty() {
        prompt.push_str("\nFollow this example of the style:\n");
        prompt.push_str(exemplar.trim());
        prompt.push('\n');
    }
    prompt.push_str(
        "\nStrict rules:\n\
         - Return only the LaTeX body. Do not write \\documentclass, \\usepackage, \
         \\begin{document} or \\end{document}.\n\
         - Do not include images, figures or \\includegraphics.\n\
         - Do not use complex tables (no longtable, tabularx, multirow or multicolumn).\n\
         - Do not write raw Unicode math symbols; write math with LaTeX commands inside $...$.\n\
         - Nest lists and environments at most three levels deep.\n\
         - Escape the reserved characters & % $ # _ { } ~ ^ \\ in ordinary text.\n\
         - Close every \\begin{...} with its matching \\end{...}.\n\
         - Do not invent content and keep the language of the original text.\n\
         - No explanations and no markdown code fences.\n\
         \nText to format:\n\n",
    );
    prompt.push_str(source_text.trim());
    prompt
}

/// Reduce a generator reply to a bare LaTeX body: strip code fences and any
/// preamble or `document` environment the generator emitted anyway.
pub fn sanitize_latex(raw: &str) -> String {
    let unfenced = unfence(raw);
    let unfenced = unfenced.trim();
    let inner = match DOCUMENT_BODY_RE.captures(unfenced) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()),
        None => unfenced,
    };
    let without_preamble = PREAMBLE_LINE_RE.replace_all(inner, "");
    DOCUMENT_MARKER_RE
        .replace_all(&without_preamble, "")
        .trim()
        .to_string()
}

/// The longest fenced block of `raw` if there is one (prose around it is
/// dropped), else `raw` without any stray fence lines.
fn unfence(raw: &str) -> String {
    let longest = FENCED_BLOCK_RE
        .captures_iter(raw)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str())
        .max_by_key(|block| block.len());
    match longest {
        Some(block) => block.to_string(),
        None => FENCE_LINE_RE.replace_all(raw, "").into_owned(),
    }
}

/// Count `\begin{env}` against `\end{env}` per environment, ignoring
/// comments. Returns one finding per mismatched environment.
pub fn check_balance(body: &str) -> Vec<String> {
    let mut counts: BTreeMap<&str, (usize, usize)> = BTreeMap::new();
    for line in body.lines() {
        let code = strip_comment(line);
        for caps in ENVIRONMENT_RE.captures_iter(code) {
            let (Some(kind), Some(name)) = (caps.get(1), caps.get(2)) else {
                continue;
            };
            let entry = counts.entry(name.as_str().trim()).or_default();
            if kind.as_str() == "begin" {
                entry.0 += 1;
            } else {
                entry.1 += 1;
            }
        }
    }
    counts
        .into_iter()
        .filter(|(_, (begins, ends))| begins != ends)
        .map(|(name, (begins, ends))| {
            format!("environment `{name}`: {begins} \\begin vs {ends} \\end")
        })
        .collect()
}

/// `line` up to its first unescaped `%`.
fn strip_comment(line: &str) -> &str {
    let bytes = line.as_bytes();
    for (i, &b) in bytes.iter().enumerate() {
        if b == b'%' {
            let backslashes = bytes[..i].iter().rev().take_while(|&&c| c == b'\\').count();
            if backslashes % 2 == 0 {
                return &line[..i];
            }
        }
    }
    line
}

fn wrap_document(body: &str) -> String {
    format!("{PREAMBLE}\\begin{{document}}\n{body}\n\\end{{document}}\n")
}

fn tail_lines(text: &str, n: usize) -> String {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(n);
    lines[start..].join("\n").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_strips_fences_and_preamble() {
        let raw = "```latex\n\\documentclass{article}\n\\usepackage{amsmath}\n\\begin{document}\n\\section{Intro}\nHello.\n\\end{document}\n```";
        assert_eq!(sanitize_latex(raw), "\\section{Intro}\nHello.");
    }

    #[test]
    fn sanitize_drops_prose_before_fenced_block() {
        let raw = "Here is the formatted LaTeX:\n```latex\n\\section{Intro}\nHello.\n```";
        let out = sanitize_latex(raw);
        assert_eq!(out, "\\section{Intro}\nHello.");
    }

    #[test]
    fn sanitize_drops_note_after_fenced_block() {
        let raw = "```latex\n\\section{Intro}\nHello.\n```\nLet me know if you need changes.";
        let out = sanitize_latex(raw);
        assert!(!out.contains("```"));
        assert_eq!(out, "\\section{Intro}\nHello.");
    }

    #[test]
    fn sanitize_prefers_the_longest_fenced_block() {
        let raw = "Compile with:\n```sh\npdflatex x.tex\n```\nBody:\n```latex\n\\section{Intro}\nA longer body here.\n```";
        assert_eq!(sanitize_latex(raw), "\\section{Intro}\nA longer body here.");
    }

    #[test]
    fn sanitize_drops_unclosed_fence_line() {
        let raw = "```latex\n\\section{Intro}\nHello.";
        assert_eq!(sanitize_latex(raw), "\\section{Intro}\nHello.");
    }

    #[test]
    fn sanitize_handles_missing_end_document() {
        let raw = "\\documentclass{article}\n\\begin{document}\n\\section{A}\ntext";
        assert_eq!(sanitize_latex(raw), "\\section{A}\ntext");
    }

    #[test]
    fn sanitize_keeps_plain_body() {
        let raw = "\\section{Results}\n\\begin{itemize}\n\\item x\n\\end{itemize}";
        assert_eq!(sanitize_latex(raw), raw);
    }

    #[test]
    fn sanitize_drops_stray_preamble_lines_and_markers() {
        let raw = "\\usepackage{graphicx}\n\\section{A}\n\\end{document}";
        assert_eq!(sanitize_latex(raw), "\\section{A}");
    }

    #[test]
    fn balanced_body_has_no_findings() {
        let body = "\\begin{abstract}x\\end{abstract}\n\\begin{itemize}\n\\begin{itemize}\\item a\\end{itemize}\n\\end{itemize}";
        assert!(check_balance(body).is_empty());
    }

    #[test]
    fn imbalance_is_reported_per_environment() {
        let body = "\\begin{itemize}\n\\item a\n\\begin{enumerate}\\item b\\end{enumerate}\n\\end{table}";
        assert_eq!(
            check_balance(body),
            vec![
                "environment `itemize`: 1 \\begin vs 0 \\end".to_string(),
                "environment `table`: 0 \\begin vs 1 \\end".to_string(),
            ]
        );
    }

    #[test]
    fn commented_environments_are_ignored() {
        let body = "% \\begin{figure}\n100\\% done \\begin{center}x\\end{center}";
        assert!(check_balance(body).is_empty());
        assert_eq!(strip_comment("a \\% b % c"), "a \\% b ");
        assert_eq!(strip_comment("a \\\\% c"), "a \\\\");
    }

    #[test]
    fn wrapper_has_one_document_environment() {
        let doc = wrap_document("\\section{A}");
        assert!(doc.starts_with("\\documentclass"));
        assert_eq!(doc.matches("\\begin{document}").count(), 1);
        assert!(doc.trim_end().ends_with("\\end{document}"));
    }

    #[test]
    fn prompt_lists_constraints_and_exemplar() {
        let prompt = latex_prompt("Body text", "IEEE", "\\section{Example}");
        assert!(prompt.contains("IEEE"));
        assert!(prompt.contains("Follow this example"));
        assert!(prompt.contains("\\includegraphics"));
        assert!(prompt.contains("Unicode math"));
        assert!(prompt.ends_with("Body text"));

        let without = latex_prompt("Body", "ACM", "  ");
        assert!(!without.contains("Follow this example"));
    }

    #[test]
    fn tail_keeps_last_lines() {
        let text: String = (1..=50).map(|i| format!("line {i}\n")).collect();
        let tail = tail_lines(&text, 40);
        assert!(tail.starts_with("line 11"));
        assert!(tail.ends_with("line 50"));
    }
}
