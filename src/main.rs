use branchdiff::{
    BranchDiffQuery, BranchKind, ChangeRetriever, CompareMode, DEFAULT_CONTEXT_LINES, FileDiff,
    Format, WorkingTreeQuery,
};
use clap::{ArgAction, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::Shell;
use log::{LevelFilter, debug};
use serde::Serialize;
use std::io;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "branchdiff", version)]
#[command(about = "Structured git diffs with automatic remote branch tracking")]
struct Cli {
    /// Repository to operate on
    #[arg(short = 'C', long = "repo", env = "BRANCHDIFF_REPO", default_value = ".", global = true)]
    repo: PathBuf,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Plain, global = true)]
    format: OutputFormat,

    /// More logging (-v debug, -vv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Show unstaged (or staged) changes in the working tree
    Diff {
        /// Compare the index with HEAD instead
        #[arg(long, alias = "cached")]
        staged: bool,
        /// Lines of context around each change
        #[arg(short = 'U', long = "unified", default_value_t = DEFAULT_CONTEXT_LINES)]
        context: u32,
        /// Limit to these paths
        paths: Vec<String>,
    },
    /// Show the changes made by a commit, or between two commits
    Show {
        commit: String,
        /// Compare `commit..to` instead of the commit against its parent
        to: Option<String>,
        #[arg(short = 'U', long = "unified", default_value_t = DEFAULT_CONTEXT_LINES)]
        context: u32,
    },
    /// Compare two branches, tracking remote-only ones locally first
    Compare {
        base: String,
        target: String,
        #[arg(long, value_enum, default_value_t = Mode::Triple)]
        mode: Mode,
        #[arg(short = 'U', long = "unified", default_value_t = DEFAULT_CONTEXT_LINES)]
        context: u32,
    },
    /// List local and remote-tracking branches
    Branches,
    /// Resolve a branch name to a local branch
    Resolve { name: String },
    /// Check out a branch, tracking it locally first if it only exists on a remote
    Switch {
        branch: String,
        /// Stash local changes before switching
        #[arg(long)]
        auto_stash: bool,
    },
    /// Show recent commits and the files they touched
    Log {
        #[arg(short = 'n', long, default_value_t = 10)]
        limit: usize,
    },
    /// Print shell completions
    Completions { shell: Shell },
    /// Print a man page
    Man,
}

#[derive(Clone, Copy, ValueEnum)]
enum OutputFormat {
    Plain,
    Report,
    Json,
}

impl From<OutputFormat> for Format {
    fn from(format: OutputFormat) -> Self {
        match format {
            OutputFormat::Plain => Format::Plain,
            OutputFormat::Report => Format::Report,
            OutputFormat::Json => Format::Json,
        }
    }
}

#[derive(Clone, Copy, ValueEnum)]
enum Mode {
    /// base...target
    Triple,
    /// base..target
    Double,
}

impl From<Mode> for CompareMode {
    fn from(mode: Mode) -> Self {
        match mode {
            Mode::Triple => CompareMode::TripleDot,
            Mode::Double => CompareMode::DoubleDot,
        }
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let format = cli.format;
    let retriever = || ChangeRetriever::open(&cli.repo);

    match cli.command {
        Commands::Diff {
            staged,
            context,
            paths,
        } => {
            let query = WorkingTreeQuery {
                staged,
                context_lines: context,
                paths,
            };
            let files = retriever()?.working_tree_diff(&query)?;
            print_files(format, &files)?;
        }
        Commands::Show {
            commit,
            to,
            context,
        } => {
            let files = retriever()?.commit_diff(&commit, to.as_deref(), context)?;
            print_files(format, &files)?;
        }
        Commands::Compare {
            base,
            target,
            mode,
            context,
        } => {
            let mut query = BranchDiffQuery::new(base, target).with_mode(mode.into());
            query.context_lines = context;
            let result = retriever()?.branch_diff(&query)?;

            if let OutputFormat::Json = format {
                print_json(&result)?;
            } else {
                for message in &result.comparison.messages {
                    eprintln!("{message}");
                }
                print_files(format, &result.files)?;
            }
        }
        Commands::Branches => {
            let branches = retriever()?.list_branches()?;
            if let OutputFormat::Json = format {
                print_json(&branches)?;
            } else {
                for branch in &branches {
                    let marker = if branch.is_current { '*' } else { ' ' };
                    let kind = match branch.kind {
                        BranchKind::Local => "local",
                        BranchKind::Remote if branch.needs_localization => "remote, untracked",
                        BranchKind::Remote => "remote",
                    };
                    let short_id = branch.commit_id.get(..7).unwrap_or(&branch.commit_id);
                    println!("{marker} {} {short_id} ({kind})", branch.name);
                }
            }
        }
        Commands::Resolve { name } => {
            let resolution = retriever()?.resolve_branch(&name)?;
            if let OutputFormat::Json = format {
                print_json(&resolution)?;
            } else {
                if let Some(message) = &resolution.message {
                    eprintln!("{message}");
                }
                println!("{}", resolution.local_branch);
            }
        }
        Commands::Switch { branch, auto_stash } => {
            let outcome = retriever()?.switch_branch(&branch, auto_stash)?;
            if let OutputFormat::Json = format {
                print_json(&outcome)?;
            } else {
                for message in &outcome.messages {
                    println!("{message}");
                }
            }
        }
        Commands::Log { limit } => {
            let commits = retriever()?.log(limit)?;
            if let OutputFormat::Json = format {
                print_json(&commits)?;
            } else {
                for commit in &commits {
                    let short_hash = commit.hash.get(..7).unwrap_or(&commit.hash);
                    println!(
                        "{short_hash} {} ({}, {})",
                        commit.subject, commit.author, commit.date
                    );
                    for file in &commit.files {
                        println!("    {file}");
                    }
                }
            }
        }
        Commands::Completions { shell } => {
            clap_complete::generate(shell, &mut Cli::command(), "branchdiff", &mut io::stdout());
        }
        Commands::Man => {
            clap_mangen::Man::new(Cli::command()).render(&mut io::stdout())?;
        }
    }

    Ok(())
}

/// `-v` turns on debug output, `-vv` trace; otherwise `RUST_LOG` decides
fn init_logging(verbose: u8) {
    let env = env_logger::Env::default().default_filter_or("warn");
    let mut builder = env_logger::Builder::from_env(env);
    match verbose {
        0 => {}
        1 => {
            builder.filter_level(LevelFilter::Debug);
        }
        _ => {
            builder.filter_level(LevelFilter::Trace);
        }
    }
    builder.format_target(false).format_timestamp(None).init();
    debug!("Verbose logging enabled");
}

fn print_files(
    format: OutputFormat,
    files: &[FileDiff],
) -> Result<(), Box<dyn std::error::Error>> {
    print!("{}", Format::from(format).render(files)?);
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
