// cli/src/bgenvctl/setenv.rs — bg_setenv: queue changes, then write one slot or file
//
// Arguments are validated and turned into journal actions before any storage
// is touched. The journal is then replayed against exactly one target.

use std::path::{Path, PathBuf};

use bootguard_env::selector::check_slot_index;
use bootguard_env::session::update_file;
use bootguard_env::{
    EnvAction, EnvFile, EnvSession, EnvString, Journal, JournalReport, RecordState, SessionTarget,
    UserVarFlags, UserVarKind, UserVarType, Ustate, ENV_NUM_CONFIG_PARTS, FAT_ENV_FILENAME,
};
use clap::Parser;
use tracing::{debug, warn};

use super::config::Config;
use super::error::CliError;
use super::logging;
use super::printenv::{dump_slots, render, OutputFields};
use super::slots::FileSlotStore;

#[derive(Parser, Debug, Default)]
#[command(
    name = "bg_setenv",
    about = "Modify the EFI Boot Guard environment",
    disable_version_flag = true
)]
pub struct SetArgs {
    /// Write a stand-alone environment file instead of a config partition
    #[arg(short = 'f', long = "filepath", value_name = "ENVFILE")]
    pub filepath: Option<PathBuf>,

    /// Edit config partition ENV_PART in place
    #[arg(short = 'p', long = "part", value_name = "ENV_PART", conflicts_with = "update")]
    pub part: Option<usize>,

    /// Be verbose
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Print version
    #[arg(short = 'V', long)]
    pub version: bool,

    /// Start from the existing file contents (with -f)
    #[arg(short = 'P', long)]
    pub preserve: bool,

    /// Set kernel to load
    #[arg(short = 'k', long, value_name = "KERNEL")]
    pub kernel: Option<String>,

    /// Set kernel arguments
    #[arg(short = 'a', long, value_name = "KERNEL_ARGS")]
    pub args: Option<String>,

    /// Set revision value
    #[arg(short = 'r', long, value_name = "REVISION")]
    pub revision: Option<String>,

    /// Set update status: 0-3 or OK, INSTALLED, TESTING, FAILED
    #[arg(short = 's', long, value_name = "USTATE")]
    pub ustate: Option<String>,

    /// Watchdog timeout in seconds
    #[arg(short = 'w', long, value_name = "WATCHDOG_TIMEOUT")]
    pub watchdog: Option<String>,

    /// Confirm working environment
    #[arg(short = 'c', long)]
    pub confirm: bool,

    /// Automatically update oldest revision
    #[arg(short = 'u', long)]
    pub update: bool,

    /// Set user variable; KEY= or KEY alone deletes it
    #[arg(short = 'x', long = "uservar", value_name = "KEY=VAL")]
    pub uservar: Vec<String>,

    /// Set in_progress variable (0 or 1)
    #[arg(short = 'i', long = "in_progress", value_name = "IN_PROGRESS")]
    pub in_progress: Option<String>,

    /// Slot configuration file
    #[arg(long, value_name = "PATH", env = "BG_ENV_CONFIG")]
    pub config: Option<PathBuf>,
}

impl SetArgs {
    /// True when at least one option asks for something to happen.
    pub fn has_task(&self) -> bool {
        self.filepath.is_some()
            || self.part.is_some()
            || self.verbose
            || self.preserve
            || self.kernel.is_some()
            || self.args.is_some()
            || self.revision.is_some()
            || self.ustate.is_some()
            || self.watchdog.is_some()
            || self.confirm
            || self.update
            || !self.uservar.is_empty()
            || self.in_progress.is_some()
    }

    pub fn target(&self) -> SessionTarget {
        match (self.update, self.part) {
            (true, _) => SessionTarget::AutoUpdate,
            (false, Some(index)) => SessionTarget::Index(index),
            (false, None) => SessionTarget::Latest,
        }
    }
}

/// Validate every option and queue the resulting actions.
pub fn build_journal(args: &SetArgs) -> Result<Journal, CliError> {
    let mut journal = Journal::new();

    if let Some(kernel) = &args.kernel {
        EnvString::new("kernel filename", kernel)?;
        journal.push(EnvAction::set_str("kernelfile", kernel))?;
    }
    if let Some(params) = &args.args {
        EnvString::new("kernel arguments", params)?;
        journal.push(EnvAction::set_str("kernelparams", params))?;
    }
    if let Some(revision) = &args.revision {
        let value: u32 = parse_number(revision)
            .ok_or_else(|| CliError::validation("Invalid revision specified."))?;
        debug!("revision is set to {}", value);
        journal.push(EnvAction::set_str("revision", &value.to_string()))?;
    }
    if let Some(watchdog) = &args.watchdog {
        let value: u32 = parse_number(watchdog)
            .ok_or_else(|| CliError::validation("Invalid watchdog timeout specified."))?;
        debug!("setting watchdog timeout to {} seconds", value);
        journal.push(EnvAction::set_str("watchdog_timeout_sec", &value.to_string()))?;
    }
    if let Some(in_progress) = &args.in_progress {
        match parse_number::<u8>(in_progress) {
            Some(value @ (0 | 1)) => {
                journal.push(EnvAction::set_str("in_progress", &value.to_string()))?
            }
            _ => {
                return Err(CliError::validation(
                    "Invalid value specified. Possible values: 0 (no), 1 (yes)",
                ))
            }
        }
    }
    if let Some(ustate) = &args.ustate {
        let state = parse_ustate(ustate)?;
        debug!("ustate set to {} ({})", state.as_u16(), state);
        journal.push(EnvAction::set_str("ustate", &state.as_u16().to_string()))?;
    }
    if args.confirm {
        debug!("confirming environment to work, removing boot-once and testing flag");
        journal.push(EnvAction::set_str("ustate", &Ustate::Ok.as_u16().to_string()))?;
    }
    for spec in &args.uservar {
        journal.push(parse_uservar(spec)?)?;
    }
    Ok(journal)
}

/// A number, or a state name matched case-insensitively by prefix.
pub fn parse_ustate(text: &str) -> Result<Ustate, CliError> {
    let out_of_range = || {
        CliError::validation(
            "Invalid ustate value specified. Possible values: \
             0 (OK), 1 (INSTALLED), 2 (TESTING), 3 (FAILED)",
        )
    };
    if let Some(number) = parse_number::<i64>(text) {
        let raw = u16::try_from(number).map_err(|_| out_of_range())?;
        return Ustate::from_u16(raw).map_err(|_| out_of_range());
    }
    match Ustate::parse(text) {
        Ustate::Unknown => Err(CliError::validation("Invalid state specified.")),
        state => Ok(state),
    }
}

/// `KEY=VAL` sets an ASCII user variable; `KEY=` and `KEY` delete it.
pub fn parse_uservar(spec: &str) -> Result<EnvAction, CliError> {
    let (key, value) = match spec.split_once('=') {
        Some((key, value)) => (key, value),
        None => (spec, ""),
    };
    if key.is_empty() {
        return Err(CliError::validation(format!("Invalid user variable {:?}", spec)));
    }
    if value.is_empty() {
        return Ok(EnvAction::delete(key));
    }
    let ty = UserVarType::new(UserVarKind::Ascii).with(UserVarFlags::DEFAULT);
    Ok(EnvAction::set(key, ty, value.as_bytes()))
}

fn parse_number<T: std::str::FromStr>(text: &str) -> Option<T> {
    text.parse().ok()
}

/// `-f DIR` is the deprecated spelling of `-f DIR/BGENV.DAT`.
pub fn resolve_env_path(path: &Path) -> PathBuf {
    if path.is_dir() {
        eprintln!("WARNING: Using -f to specify only the output directory is deprecated.");
        path.join(FAT_ENV_FILENAME)
    } else {
        path.to_path_buf()
    }
}

pub fn run(args: SetArgs) -> Result<(), CliError> {
    logging::init(args.verbose);
    if args.version {
        super::print_version();
        return Ok(());
    }
    if !args.has_task() {
        return Err(CliError::usage(
            "No task to perform. Please specify at least one optional argument. \
             See --help for further information.",
        ));
    }
    if let Some(part) = args.part {
        check_slot_index(part, ENV_NUM_CONFIG_PARTS)?;
    }
    let mut journal = build_journal(&args)?;

    if let Some(path) = &args.filepath {
        let path = resolve_env_path(path);
        let file = EnvFile::new(&path);
        let outcome = update_file(&file, args.preserve, &mut journal, &mut RecordState)?;
        if args.verbose {
            print!("{}", render(&outcome.record, OutputFields::ALL)?);
        }
        check_report(&outcome.report)?;
        println!("Output written to {}.", path.display());
        return Ok(());
    }

    let config = Config::load(args.config.as_deref())?;
    let mut store = FileSlotStore::open(&config);
    if args.verbose {
        if let Err(e) = dump_slots(&mut store, OutputFields::ALL) {
            warn!("{}", e);
        }
        println!("Processing journal...");
    }

    let mut session = EnvSession::new(&mut store);
    let outcome = session.update(args.target(), &mut journal)?;
    session.finalize()?;

    if args.verbose {
        println!("New environment data:");
        println!("---------------------");
        print!("{}", render(&outcome.record, OutputFields::ALL)?);
    }
    check_report(&outcome.report)?;
    println!("Environment update was successful.");
    Ok(())
}

fn check_report(report: &JournalReport) -> Result<(), CliError> {
    for (key, e) in &report.failed {
        CliError::validation(format!("{}: {}", key, e)).report();
    }
    if report.is_clean() {
        Ok(())
    } else {
        Err(CliError::Rejected { count: report.failed.len() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bootguard_env::{EnvOperation, EnvRecord};
    use pretty_assertions::assert_eq;

    fn replay(args: &SetArgs) -> EnvRecord {
        let mut journal = build_journal(args).unwrap();
        let mut record = EnvRecord::blank();
        assert!(journal.drain_and_apply(&mut record, &mut RecordState).is_clean());
        record
    }

    #[test]
    fn ustate_by_number_or_name() {
        assert_eq!(parse_ustate("2").unwrap(), Ustate::Testing);
        assert_eq!(parse_ustate("failed").unwrap(), Ustate::Failed);
        assert_eq!(parse_ustate("Installed").unwrap(), Ustate::Installed);
        assert!(matches!(parse_ustate("4"), Err(CliError::Validation(_))));
        assert!(matches!(parse_ustate("-1"), Err(CliError::Validation(_))));
        assert!(matches!(parse_ustate("unknown"), Err(CliError::Validation(_))));
    }

    #[test]
    fn uservar_forms() {
        let set = parse_uservar("board=rev-c").unwrap();
        assert_eq!(set.operation, EnvOperation::Set);
        assert_eq!(set.key, "board");
        assert_eq!(set.data, b"rev-c");
        assert_eq!(set.ty.kind, UserVarKind::Ascii);

        assert_eq!(parse_uservar("board=").unwrap().operation, EnvOperation::Delete);
        assert_eq!(parse_uservar("board").unwrap().operation, EnvOperation::Delete);
        assert!(parse_uservar("=x").is_err());
    }

    #[test]
    fn options_become_record_fields() {
        let args = SetArgs {
            kernel: Some("vmlinuz-6".into()),
            args: Some("console=ttyS0".into()),
            revision: Some("12".into()),
            watchdog: Some("45".into()),
            in_progress: Some("1".into()),
            ustate: Some("testing".into()),
            uservar: vec!["slot=b".into()],
            ..SetArgs::default()
        };
        let r = replay(&args);
        assert_eq!(r.kernel_file.to_narrow(), "vmlinuz-6");
        assert_eq!(r.kernel_params.to_narrow(), "console=ttyS0");
        assert_eq!(r.revision, 12);
        assert_eq!(r.watchdog_timeout_sec, 45);
        assert!(r.in_progress);
        assert_eq!(r.ustate, Ustate::Testing.as_u16());
        assert_eq!(r.user_vars.get("slot").unwrap().unwrap().format_value().unwrap(), "b");
    }

    #[test]
    fn confirm_resets_state_after_explicit_ustate() {
        let args = SetArgs {
            ustate: Some("3".into()),
            in_progress: Some("1".into()),
            confirm: true,
            ..SetArgs::default()
        };
        let r = replay(&args);
        assert_eq!(r.ustate, 0);
        assert!(!r.in_progress);
    }

    #[test]
    fn invalid_numbers_are_rejected_up_front() {
        for args in [
            SetArgs { revision: Some("12x".into()), ..SetArgs::default() },
            SetArgs { watchdog: Some("-5".into()), ..SetArgs::default() },
            SetArgs { in_progress: Some("2".into()), ..SetArgs::default() },
            SetArgs { kernel: Some("k".repeat(256)), ..SetArgs::default() },
        ] {
            let err = build_journal(&args).unwrap_err();
            assert_eq!(err.status(), crate::bgenvctl::error::EXIT_VALIDATION, "{:?}", args);
        }
    }

    #[test]
    fn target_selection() {
        assert_eq!(SetArgs::default().target(), SessionTarget::Latest);
        let part = SetArgs { part: Some(1), ..SetArgs::default() };
        assert_eq!(part.target(), SessionTarget::Index(1));
        let update = SetArgs { update: true, ..SetArgs::default() };
        assert_eq!(update.target(), SessionTarget::AutoUpdate);
        assert!(!SetArgs::default().has_task());
    }
}
