use clap::{Parser, Subcommand, ValueEnum};
use idf_workflow::FlashType;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "idf-build", author, version)]
#[command(about = "🔨 Build ESP-IDF projects: hooks, CMake/Ninja, size report and DFU image")]
pub struct Cli {
    /// ESP-IDF project directory
    #[arg(short = 'w', long, default_value = ".", global = true)]
    pub workspace: PathBuf,

    /// Settings file (defaults to <workspace>/.idf-build.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Append logs to this file instead of stderr
    #[arg(long, global = true)]
    pub log_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 🔨 Build the project (pre-build hook, build, size, post-build hook, DFU)
    Build {
        /// Flash method the build is meant for; `dfu` also produces dfu.bin
        #[arg(long, value_enum, default_value_t = FlashTypeArg::Uart)]
        flash_type: FlashTypeArg,

        /// Re-run the CMake configure step even if the build dir is configured
        #[arg(long)]
        reconfigure: bool,
    },
    /// 📏 Print size information for an existing build
    Size,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FlashTypeArg {
    Uart,
    Jtag,
    Dfu,
}

impl From<FlashTypeArg> for FlashType {
    fn from(arg: FlashTypeArg) -> Self {
        match arg {
            FlashTypeArg::Uart => FlashType::Uart,
            FlashTypeArg::Jtag => FlashType::Jtag,
            FlashTypeArg::Dfu => FlashType::Dfu,
        }
    }
}
