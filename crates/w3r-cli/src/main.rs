use clap::{Args as ClapArgs, Parser, Subcommand, ValueEnum};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use w3r_core::{Error, ExportConfig, OutputFormat, ReadLevel, SaveGame};

const DEFAULT_SAVE: &str = "QuickSave.sav";

#[derive(Parser, Debug)]
#[command(
    name = "w3r",
    about = "Export quest statuses and map pin tags from Witcher 3 saves",
    version
)]
struct Cli {
    /// More log output (-v info, -vv debug); RUST_LOG overrides
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    cmd: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Build the tracker report and write it as JSON or CSV
    Export(ExportArgs),
    /// Dump the decoded variable tree as JSON
    Dump(DumpArgs),
    /// List saves in a directory, newest last
    List(ListArgs),
    /// Print report counts, optionally against a list of quest GUIDs
    Summary(SummaryArgs),
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum FormatArg {
    Json,
    Csv,
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum LevelArg {
    Quick,
    Full,
}

impl From<FormatArg> for OutputFormat {
    fn from(f: FormatArg) -> Self {
        match f {
            FormatArg::Json => OutputFormat::Json,
            FormatArg::Csv => OutputFormat::Csv,
        }
    }
}

impl From<LevelArg> for ReadLevel {
    fn from(l: LevelArg) -> Self {
        match l {
            LevelArg::Quick => ReadLevel::Quick,
            LevelArg::Full => ReadLevel::Full,
        }
    }
}

#[derive(ClapArgs, Debug)]
struct ExportArgs {
    /// Save file (defaults to QuickSave.sav)
    save: Option<PathBuf>,
    /// Use the newest save in the save directory instead
    #[arg(long, conflicts_with = "save")]
    latest: bool,
    /// Save directory for --latest (defaults to $W3R_SAVE_DIR or the game's gamesaves folder)
    #[arg(long, requires = "latest")]
    save_dir: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = FormatArg::Json)]
    format: FormatArg,
    /// Output path (defaults to tw3trackerinfo.json / tw3savefile.csv)
    #[arg(long)]
    out: Option<PathBuf>,
    #[arg(long, value_enum, default_value_t = LevelArg::Quick)]
    level: LevelArg,
}

#[derive(ClapArgs, Debug)]
struct DumpArgs {
    save: PathBuf,
    /// Max children to include per group
    #[arg(long, default_value_t = 128)]
    max_children: usize,
    /// Max recursion depth
    #[arg(long, default_value_t = 16)]
    max_depth: usize,
    /// Emit opaque values as hex instead of summaries (implies --level full)
    #[arg(long, default_value_t = false)]
    bytes_full: bool,
}

#[derive(ClapArgs, Debug)]
struct ListArgs {
    /// Directory to scan (defaults to $W3R_SAVE_DIR or the game's gamesaves folder)
    dir: Option<PathBuf>,
}

#[derive(ClapArgs, Debug)]
struct SummaryArgs {
    save: PathBuf,
    /// Text file with one quest GUID per line; limits the completed count to these
    #[arg(long)]
    guids: Option<PathBuf>,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    match cli.cmd.unwrap_or(Cmd::Export(ExportArgs {
        save: None,
        latest: false,
        save_dir: None,
        format: FormatArg::Json,
        out: None,
        level: LevelArg::Quick,
    })) {
        Cmd::Export(a) => cmd_export(a),
        Cmd::Dump(a) => cmd_dump(a),
        Cmd::List(a) => cmd_list(a),
        Cmd::Summary(a) => cmd_summary(a),
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();
}

fn fail(e: &Error) -> ! {
    eprintln!("error: {}", e);
    let code = match e {
        Error::Io(_) | Error::Decode(_) => 2,
        Error::StructureMismatch(_) => 3,
        Error::Json(_) => 4,
    };
    std::process::exit(code);
}

fn load(path: &Path, level: ReadLevel) -> SaveGame {
    w3r_core::read_save_file(path, level).unwrap_or_else(|e| fail(&e))
}

fn save_dir_or_exit(dir: Option<PathBuf>) -> PathBuf {
    dir.or_else(w3r_core::saves::default_save_dir)
        .unwrap_or_else(|| {
            eprintln!("error: no save directory; pass one or set {}", w3r_core::saves::SAVE_DIR_ENV);
            std::process::exit(2);
        })
}

fn cmd_export(args: ExportArgs) {
    let save = if args.latest {
        let dir = save_dir_or_exit(args.save_dir);
        match w3r_core::saves::latest_save(&dir) {
            Ok(Some(s)) => s.path,
            Ok(None) => {
                eprintln!("error: no .sav files in {}", dir.display());
                std::process::exit(2);
            }
            Err(e) => fail(&e),
        }
    } else {
        args.save.unwrap_or_else(|| PathBuf::from(DEFAULT_SAVE))
    };
    let mut config = ExportConfig::for_format(args.format.into());
    if let Some(out) = args.out {
        config.output = out;
    }
    log::info!("exporting {} -> {}", save.display(), config.output.display());

    let report = load(&save, args.level.into())
        .report()
        .unwrap_or_else(|e| fail(&e));
    if let Err(e) = w3r_core::write_report(&report, &config) {
        eprintln!("error writing: {}", e);
        std::process::exit(4);
    }
}

fn cmd_dump(args: DumpArgs) {
    let level = if args.bytes_full {
        ReadLevel::Full
    } else {
        ReadLevel::Quick
    };
    let save = load(&args.save, level);
    let opts = w3r_core::json::JsonOpts {
        max_children: args.max_children,
        max_depth: args.max_depth,
        bytes_summary: !args.bytes_full,
    };
    let v = w3r_core::json::tree_to_json_value(&save.root, opts);
    match serde_json::to_string_pretty(&v) {
        Ok(s) => println!("{}", s),
        Err(e) => fail(&e.into()),
    }
}

fn cmd_list(args: ListArgs) {
    let dir = save_dir_or_exit(args.dir);
    let mut saves = w3r_core::saves::find_save_files(&dir).unwrap_or_else(|e| fail(&e));
    saves.sort_by_key(|s| s.modified);
    for s in saves {
        println!(
            "{}\t{}",
            s.modified.format("%Y-%m-%d %H:%M:%S"),
            s.path.display()
        );
    }
}

fn cmd_summary(args: SummaryArgs) {
    let known: Option<HashSet<String>> = args.guids.map(|p| {
        let text = std::fs::read_to_string(&p).unwrap_or_else(|e| fail(&e.into()));
        text.lines()
            .map(str::trim)
            .filter(|l| !l.is_empty())
            .map(|l| l.to_ascii_uppercase())
            .collect()
    });
    let report = load(&args.save, ReadLevel::Quick)
        .report()
        .unwrap_or_else(|e| fail(&e));
    println!("quests: {}", report.quests.len());
    println!("map pin tags: {}", report.map_pin_tags.len());
    println!("completed quests: {}", report.count_succeeded(known.as_ref()));
}
