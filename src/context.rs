//! Context assembly.
//!
//! Concatenates fetched files into one text blob for the completion
//! backend. Each file gets a header naming its path and a fenced body so the
//! model can attribute statements to files. Input order is kept.

use crate::models::FetchedFile;

/// Render one file block.
pub fn file_block(file: &FetchedFile) -> String {
    format!("### File: {}\n```\n{}\n```", file.path, file.content)
}

/// Join all files into a single context string, separated by blank lines.
pub fn assemble_context(files: &[FetchedFile]) -> String {
    files.iter().map(file_block).collect::<Vec<_>>().join("\n\n")
}
