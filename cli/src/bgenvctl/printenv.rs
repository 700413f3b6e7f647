// cli/src/bgenvctl/printenv.rs — bg_printenv: show slots or a stand-alone file

use std::fmt::Write as _;
use std::path::PathBuf;

use bootguard_env::selector::check_slot_index;
use bootguard_env::{
    EnvError, EnvFile, EnvRecord, SlotSelector, SlotStore, Ustate, ENV_NUM_CONFIG_PARTS,
};
use clap::Parser;
use serde_json::{json, Map, Value};

use super::config::Config;
use super::error::CliError;
use super::logging;
use super::slots::FileSlotStore;

#[derive(Parser, Debug)]
#[command(
    name = "bg_printenv",
    about = "Print the EFI Boot Guard environment",
    disable_version_flag = true
)]
pub struct PrintArgs {
    /// Read a stand-alone environment file instead of the config partitions
    #[arg(
        short = 'f',
        long = "filepath",
        value_name = "ENVFILE",
        conflicts_with_all = ["part", "current"]
    )]
    pub filepath: Option<PathBuf>,

    /// Only show config partition ENV_PART
    #[arg(short = 'p', long = "part", value_name = "ENV_PART", conflicts_with = "current")]
    pub part: Option<usize>,

    /// Only show the latest config partition
    #[arg(short = 'c', long)]
    pub current: bool,

    /// Comma-separated fields to show: in_progress, revision, kernel,
    /// kernelargs, watchdog_timeout, ustate, user
    #[arg(short = 'o', long = "output", value_name = "LIST")]
    pub output: Option<String>,

    /// Be verbose
    #[arg(short = 'v', long)]
    pub verbose: bool,

    /// Print version
    #[arg(short = 'V', long)]
    pub version: bool,

    /// Print records as JSON
    #[arg(long)]
    pub json: bool,

    /// Slot configuration file
    #[arg(long, value_name = "PATH", env = "BG_ENV_CONFIG")]
    pub config: Option<PathBuf>,
}

/// Which parts of a record get printed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputFields {
    pub in_progress: bool,
    pub revision: bool,
    pub kernel: bool,
    pub kernelargs: bool,
    pub watchdog_timeout: bool,
    pub ustate: bool,
    pub user: bool,
}

impl OutputFields {
    pub const ALL: OutputFields = OutputFields {
        in_progress: true,
        revision: true,
        kernel: true,
        kernelargs: true,
        watchdog_timeout: true,
        ustate: true,
        user: true,
    };

    const NONE: OutputFields = OutputFields {
        in_progress: false,
        revision: false,
        kernel: false,
        kernelargs: false,
        watchdog_timeout: false,
        ustate: false,
        user: false,
    };

    /// Parse `-o`. Empty items are skipped; an unknown name is rejected.
    pub fn parse(list: &str) -> Result<Self, CliError> {
        let mut fields = Self::NONE;
        for token in list.split(',').filter(|t| !t.is_empty()) {
            let flag = match token {
                "in_progress" => &mut fields.in_progress,
                "revision" => &mut fields.revision,
                "kernel" => &mut fields.kernel,
                "kernelargs" => &mut fields.kernelargs,
                "watchdog_timeout" => &mut fields.watchdog_timeout,
                "ustate" => &mut fields.ustate,
                "user" => &mut fields.user,
                other => {
                    return Err(CliError::validation(format!("Unknown output field: {}", other)))
                }
            };
            *flag = true;
        }
        Ok(fields)
    }
}

/// Text dump of one record.
pub fn render(record: &EnvRecord, fields: OutputFields) -> Result<String, CliError> {
    let mut out = String::from("Values:\n");
    // writing into a String cannot fail
    if fields.in_progress {
        let in_progress = if record.in_progress { "yes" } else { "no" };
        let _ = writeln!(out, "in_progress:      {}", in_progress);
    }
    if fields.revision {
        let _ = writeln!(out, "revision:         {}", record.revision);
    }
    if fields.kernel {
        let _ = writeln!(out, "kernel:           {}", record.kernel_file);
    }
    if fields.kernelargs {
        let _ = writeln!(out, "kernelargs:       {}", record.kernel_params);
    }
    if fields.watchdog_timeout {
        let _ = writeln!(out, "watchdog timeout: {} seconds", record.watchdog_timeout_sec);
    }
    if fields.ustate {
        let name = Ustate::name_of(record.ustate);
        let _ = writeln!(out, "ustate:           {} ({})", record.ustate, name);
    }
    if fields.user {
        out.push_str("\nuser variables:\n");
        for var in record.user_vars.iter() {
            let var = var?;
            let value = var.value()?;
            if value.is_printable() {
                let _ = writeln!(out, "{} = {}", var.key, value);
            } else {
                let _ = writeln!(out, "{} {}", var.key, value);
            }
        }
    }
    out.push_str("\n\n");
    Ok(out)
}

/// JSON object holding the selected fields of one record.
pub fn to_json(record: &EnvRecord, fields: OutputFields) -> Result<Value, CliError> {
    let mut obj = Map::new();
    if fields.in_progress {
        obj.insert("in_progress".into(), json!(record.in_progress));
    }
    if fields.revision {
        obj.insert("revision".into(), json!(record.revision));
    }
    if fields.kernel {
        obj.insert("kernel".into(), serde_json::to_value(&record.kernel_file)?);
    }
    if fields.kernelargs {
        obj.insert("kernelargs".into(), serde_json::to_value(&record.kernel_params)?);
    }
    if fields.watchdog_timeout {
        obj.insert("watchdog_timeout".into(), json!(record.watchdog_timeout_sec));
    }
    if fields.ustate {
        obj.insert("ustate".into(), json!(record.ustate));
        obj.insert("ustate_name".into(), json!(Ustate::name_of(record.ustate)));
    }
    if fields.user {
        let mut user = Map::new();
        for var in record.user_vars.iter() {
            let var = var?;
            user.insert(var.key.to_string(), serde_json::to_value(var.value()?)?);
        }
        obj.insert("user".into(), Value::Object(user));
    }
    Ok(Value::Object(obj))
}

/// Every slot, in index order. Stops at the first slot that cannot be read.
pub fn dump_slots(store: &mut dyn SlotStore, fields: OutputFields) -> Result<(), CliError> {
    for index in 0..store.slot_count() {
        print!("\n----------------------------\n Config Partition #{} ", index);
        let record = read_record(store, index)?;
        print!("{}", render(&record, fields)?);
    }
    Ok(())
}

pub fn run(args: PrintArgs) -> Result<(), CliError> {
    logging::init(args.verbose);
    if args.version {
        super::print_version();
        return Ok(());
    }
    let fields = match args.output.as_deref() {
        Some(list) => OutputFields::parse(list)?,
        None => OutputFields::ALL,
    };
    if let Some(part) = args.part {
        check_slot_index(part, ENV_NUM_CONFIG_PARTS)?;
    }

    if let Some(path) = &args.filepath {
        let record = EnvFile::new(path).load()?;
        return emit(&record, fields, args.json);
    }

    let config = Config::load(args.config.as_deref())?;
    let mut store = FileSlotStore::open(&config);

    if args.current {
        let selector = SlotSelector::scan(&mut store);
        let latest = selector.select_latest()?;
        if !args.json {
            println!("Using latest config partition");
        }
        emit(&read_record(&mut store, latest)?, fields, args.json)
    } else if let Some(part) = args.part {
        if !args.json {
            println!("Using config partition #{}", part);
        }
        emit(&read_record(&mut store, part)?, fields, args.json)
    } else if args.json {
        let mut all = Vec::with_capacity(store.slot_count());
        for index in 0..store.slot_count() {
            let record = read_record(&mut store, index)?;
            let mut value = to_json(&record, fields)?;
            if let Value::Object(obj) = &mut value {
                obj.insert("partition".into(), json!(index));
            }
            all.push(value);
        }
        println!("{}", serde_json::to_string_pretty(&all)?);
        Ok(())
    } else {
        dump_slots(&mut store, fields)
    }
}

fn read_record(store: &mut dyn SlotStore, index: usize) -> Result<EnvRecord, CliError> {
    store
        .read_slot(index)
        .and_then(|bytes| EnvRecord::decode(&bytes))
        .map_err(|e| CliError::Env(EnvError::Slot { index, source: Box::new(e) }))
}

fn emit(record: &EnvRecord, fields: OutputFields, json: bool) -> Result<(), CliError> {
    if json {
        println!("{}", serde_json::to_string_pretty(&to_json(record, fields)?)?);
    } else {
        print!("{}", render(record, fields)?);
    }
    Ok(())
}
