use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

/// Draftguard: organize and track long-form writing projects in plain folders.
///
/// Items are addressed by extension-less paths of the form
/// `PROJECT/CHAPTER/SECTION`, e.g. `Novel/Ch1/Notes`.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Override the default workspace path detection.
    #[arg(long, global = true, env = "DRAFTGUARD_WORKSPACE")]
    pub workspace: Option<PathBuf>,

    /// Increase verbosity (use multiple times for more).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Suppress all output except errors.
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Create a new workspace. Defaults to the current directory.
    Init {
        /// Path where the workspace should be created.
        path: Option<PathBuf>,
    },
    /// Show information about the current workspace.
    Info,
    /// Print the project tree with status and progress.
    Tree {
        /// Limit output to one project.
        project: Option<String>,
    },
    /// Create a new project (top-level directory).
    NewProject {
        name: String,
    },
    /// Create a new empty document at the given path.
    New {
        /// Destination, e.g. `Novel/Ch2` or `Novel/Ch1/Notes`.
        path: String,
    },
    /// Rename a document, keeping its children attached.
    Rename {
        path: String,
        new_name: String,
    },
    /// Move a document relative to another one.
    Mv(MvArgs),
    /// Delete a document and everything below it.
    Rm {
        path: String,
        /// Skip the confirmation prompt.
        #[arg(long, short)]
        force: bool,
    },
    /// Advance a document to the next status in the cycle.
    Upgrade {
        path: String,
    },
    /// Manage comments anchored to a document's paragraphs.
    Comment(CommentArgs),
    /// Overwrite a document's content from a file or stdin.
    Save {
        path: String,
        /// Read the new content from this file instead of stdin.
        #[arg(long, short)]
        from: Option<PathBuf>,
    },
}

#[derive(Args, Debug)]
pub struct MvArgs {
    /// The document to move.
    pub source: String,

    /// The drop target. By default the source is placed after the target;
    /// dropping after a top-level document nests the source inside it.
    pub target: String,

    /// Insert before the target instead of after it.
    #[arg(long, short)]
    pub before: bool,
}

#[derive(Args, Debug)]
pub struct CommentArgs {
    #[command(subcommand)]
    pub command: CommentCommands,
}

#[derive(Subcommand, Debug)]
pub enum CommentCommands {
    /// Attach a comment to a paragraph (zero-based).
    Add {
        path: String,
        paragraph: usize,
        text: String,
    },
    /// List a document's comments.
    List {
        path: String,
    },
}
