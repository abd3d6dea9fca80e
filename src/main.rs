use clap::{Args, Parser, Subcommand};
use glob::glob;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use expediente_pdf::{
    classify_links, page_count, rewrite_file, ClassifyOptions, Hyperlink, NoticeOptions,
    OpenActionPolicy, RelinkError, RewriteOptions, DEFAULT_MARKER,
};

/// Make the links of a rendered case-file PDF open their attachments
#[derive(Parser, Debug)]
#[command(name = "expediente-pdf", about = "Normalize attachment links in case-file PDFs")]
struct Cli {
    /// Log every annotation, not just decisions
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Rewrite marked links in rendered PDFs, in place
    Rewrite(RewriteArgs),
    /// Print the page count of each PDF
    Pages {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Mark local links and add page counts; prints JSON
    Classify(ClassifyArgs),
}

#[derive(Args, Debug)]
struct RewriteArgs {
    /// PDF files or glob patterns
    #[arg(required = true)]
    patterns: Vec<String>,
    /// Prefix of links still to be rewritten
    #[arg(long, default_value = DEFAULT_MARKER)]
    marker: String,
    /// Text of the open-time advisory
    #[arg(long)]
    notice_message: Option<String>,
    /// What to do with an existing document open action
    #[arg(long, value_enum, default_value_t = OpenActionPolicy::Chain)]
    open_action: OpenActionPolicy,
    /// Do not install the open-time advisory
    #[arg(long, default_value_t = false)]
    no_notice: bool,
    /// Report what would change without writing
    #[arg(long, default_value_t = false)]
    dry_run: bool,
    /// Print one JSON report per file
    #[arg(long, default_value_t = false)]
    json: bool,
}

impl RewriteArgs {
    fn options(&self) -> RewriteOptions {
        let notice = (!self.no_notice).then(|| {
            let mut notice = NoticeOptions::default();
            if let Some(msg) = &self.notice_message {
                notice.message = msg.clone();
            }
            notice
        });
        RewriteOptions {
            marker: self.marker.clone(),
            notice,
            open_action: self.open_action,
            dry_run: self.dry_run,
        }
    }
}

#[derive(Args, Debug)]
struct ClassifyArgs {
    /// Case folder the links are relative to
    #[arg(long)]
    base: PathBuf,
    #[arg(long, default_value = DEFAULT_MARKER)]
    marker: String,
    /// Visible text template for local PDFs ({pages}, {text})
    #[arg(long)]
    label: Option<String>,
    /// Links as HREF or HREF|TEXT
    #[arg(required = true)]
    links: Vec<String>,
}

/// Files named by `patterns`. A pattern with no match is kept as a literal
/// path so the failure to open it gets reported.
fn expand_inputs(patterns: &[String]) -> Result<Vec<PathBuf>, RelinkError> {
    let mut files = Vec::new();
    for pattern in patterns {
        let mut matched: Vec<PathBuf> = glob(pattern)?.collect::<Result<_, _>>()?;
        if matched.is_empty() {
            matched.push(PathBuf::from(pattern));
        }
        matched.sort();
        files.extend(matched);
    }
    // Overlapping patterns must not rewrite a file twice; first occurrence wins.
    let mut seen = BTreeSet::new();
    files.retain(|f| seen.insert(f.clone()));
    Ok(files)
}

fn run_rewrite(args: &RewriteArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let opts = args.options();
    let mut status = 0;
    for file in expand_inputs(&args.patterns)? {
        match rewrite_file(&file, &opts) {
            Ok(report) => {
                if args.json {
                    println!("{}", serde_json::to_string_pretty(&report)?);
                } else {
                    println!(
                        "Done. {} ({} rewritten, {} skipped)",
                        file.display(),
                        report.rewritten(),
                        report.skipped()
                    );
                }
            }
            Err(e) => {
                if let RelinkError::SwapFailure { temp, .. } = &e {
                    log::error!("rewritten copy left at {}", temp.display());
                }
                log::error!("{e}");
                status = status.max(e.exit_code());
            }
        }
    }
    Ok(status)
}

fn run_pages(files: &[PathBuf]) -> i32 {
    let mut status = 0;
    for file in files {
        match page_count(file) {
            Ok(n) => println!("{n}\t{}", file.display()),
            Err(e) => {
                log::error!("{e}");
                status = status.max(e.exit_code());
            }
        }
    }
    status
}

fn parse_link(arg: &str) -> Hyperlink {
    match arg.split_once('|') {
        Some((href, text)) => Hyperlink::new(href, text),
        None => Hyperlink::new(arg, ""),
    }
}

fn run_classify(args: &ClassifyArgs) -> Result<i32, Box<dyn std::error::Error>> {
    let mut opts = ClassifyOptions {
        marker: args.marker.clone(),
        ..ClassifyOptions::default()
    };
    if let Some(label) = &args.label {
        opts.label = label.clone();
    }
    let links: Vec<Hyperlink> = args.links.iter().map(|l| parse_link(l)).collect();
    let classified = classify_links(Path::new(&args.base), &links, &opts);
    println!("{}", serde_json::to_string_pretty(&classified)?);
    Ok(0)
}

fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let status = match &cli.command {
        Command::Rewrite(args) => run_rewrite(args)?,
        Command::Pages { files } => run_pages(files),
        Command::Classify(args) => run_classify(args)?,
    };
    Ok(ExitCode::from(status as u8))
}
