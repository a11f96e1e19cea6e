use std::io::Write;

use owo_colors::OwoColorize;

use researchflow_core::scholar::ArticleHit;
use researchflow_core::{CompiledArtifact, StructuredSummary};

/// Whether to use colored output.
#[derive(Debug, Clone, Copy)]
pub struct ColorMode(pub bool);

impl ColorMode {
    pub fn enabled(&self) -> bool {
        self.0
    }
}

fn heading(w: &mut dyn Write, title: &str, color: ColorMode) -> std::io::Result<()> {
    if color.enabled() {
        writeln!(w, "{}", title.bold().cyan())
    } else {
        writeln!(w, "{}", title)
    }
}

/// Print the four summary sections.
pub fn print_summary(
    w: &mut dyn Write,
    summary: &StructuredSummary,
    color: ColorMode,
) -> std::io::Result<()> {
    let sections = [
        ("Problem", &summary.problem),
        ("Methodology", &summary.methodology),
        ("Results", &summary.results),
        ("Conclusion", &summary.conclusion),
    ];
    for (title, body) in sections {
        heading(w, title, color)?;
        if body.is_empty() {
            if color.enabled() {
                writeln!(w, "{}", "(not stated)".dimmed())?;
            } else {
                writeln!(w, "(not stated)")?;
            }
        } else {
            writeln!(w, "{}", body)?;
        }
        writeln!(w)?;
    }
    Ok(())
}

/// Print where the formatting artifacts ended up, plus diagnostics if any.
pub fn print_artifact(
    w: &mut dyn Write,
    artifact: &CompiledArtifact,
    color: ColorMode,
) -> std::io::Result<()> {
    writeln!(w, "LaTeX source: {}", artifact.tex_path.display())?;
    match &artifact.pdf_path {
        Some(pdf) if color.enabled() => writeln!(w, "PDF: {}", pdf.display().green())?,
        Some(pdf) => writeln!(w, "PDF: {}", pdf.display())?,
        None if color.enabled() => writeln!(w, "PDF: {}", "not produced".red())?,
        None => writeln!(w, "PDF: not produced")?,
    }

    if !artifact.diagnostics.is_empty() {
        writeln!(w)?;
        heading(w, "Diagnostics", color)?;
        for line in artifact.diagnostics.lines() {
            if color.enabled() {
                writeln!(w, "  {}", line.dimmed())?;
            } else {
                writeln!(w, "  {}", line)?;
            }
        }
    }
    Ok(())
}

/// Print search hits, one block per article.
pub fn print_hits(w: &mut dyn Write, hits: &[ArticleHit], color: ColorMode) -> std::io::Result<()> {
    if hits.is_empty() {
        writeln!(w, "No articles found.")?;
        return Ok(());
    }

    for (i, hit) in hits.iter().enumerate() {
        let year = hit
            .year
            .map(|y| y.to_string())
            .unwrap_or_else(|| "n.d.".into());
        if color.enabled() {
            writeln!(w, "{}. {} ({})", i + 1, hit.title.bold(), year)?;
        } else {
            writeln!(w, "{}. {} ({})", i + 1, hit.title, year)?;
        }

        let authors = if hit.authors.len() > 3 {
            format!("{} et al.", hit.authors[..3].join(", "))
        } else {
            hit.authors.join(", ")
        };
        if !authors.is_empty() {
            writeln!(w, "   {}", authors)?;
        }

        let meta = format!("{} | {} citations", hit.journal, hit.citation_count);
        if color.enabled() {
            writeln!(w, "   {}", meta.dimmed())?;
        } else {
            writeln!(w, "   {}", meta)?;
        }
        if let Some(url) = &hit.url {
            if color.enabled() {
                writeln!(w, "   {}", url.blue())?;
            } else {
                writeln!(w, "   {}", url)?;
            }
        }

        let snippet: String = hit.abstract_text.chars().take(300).collect();
        if snippet.len() < hit.abstract_text.len() {
            writeln!(w, "   {}...", snippet.trim_end())?;
        } else {
            writeln!(w, "   {}", snippet)?;
        }
        writeln!(w)?;
    }
    Ok(())
}
