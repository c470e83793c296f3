use clap::Parser;
use std::path::PathBuf;

use mkksiso::Options;

/// Add a kickstart file, and optionally other files, to a bootable installer ISO
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "mkksiso", disable_version_flag = true)]
pub struct Cli {
    /// Kickstart file to add to the ISO
    pub kickstart: PathBuf,

    /// Installer ISO to modify
    pub input_iso: PathBuf,

    /// Where to write the new ISO
    pub output_iso: PathBuf,

    /// File or directory to add to the root of the ISO (repeatable)
    #[arg(short = 'a', long = "add", value_name = "PATH")]
    pub add_paths: Vec<PathBuf>,

    /// Extra kernel command line arguments
    #[arg(short, long, default_value = "")]
    pub cmdline: String,

    /// Volume label for the new ISO (defaults to the input ISO's label)
    #[arg(short = 'V', long)]
    pub volid: Option<String>,

    /// Do not embed an installer media checksum
    #[arg(long)]
    pub no_md5sum: bool,

    /// Enable debug logging
    #[arg(long)]
    pub debug: bool,

    /// Print version
    #[arg(long, action = clap::ArgAction::Version)]
    #[allow(dead_code)]
    version: Option<bool>,
}

impl Cli {
    pub fn into_options(self) -> Options {
        Options {
            kickstart: self.kickstart,
            input_iso: self.input_iso,
            output_iso: self.output_iso,
            add_paths: self.add_paths,
            cmdline: self.cmdline,
            volid: self.volid,
            implant_md5: !self.no_md5sum,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn short_v_is_volid_not_version() {
        let cli =
            Cli::try_parse_from(["mkksiso", "-V", "LABEL", "ks.cfg", "in.iso", "out.iso"]).unwrap();
        assert_eq!(cli.volid.as_deref(), Some("LABEL"));

        let err = Cli::try_parse_from(["mkksiso", "--version"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn parses_all_options() {
        let cli = Cli::parse_from([
            "mkksiso",
            "-a",
            "one.rpm",
            "--add",
            "updates",
            "-c",
            "console=ttyS0",
            "-V",
            "MYLABEL",
            "--no-md5sum",
            "ks.cfg",
            "in.iso",
            "out.iso",
        ]);
        let options = cli.into_options();
        assert_eq!(
            options.add_paths,
            vec![PathBuf::from("one.rpm"), PathBuf::from("updates")]
        );
        assert_eq!(options.cmdline, "console=ttyS0");
        assert_eq!(options.volid.as_deref(), Some("MYLABEL"));
        assert!(!options.implant_md5);
        assert_eq!(options.output_iso, PathBuf::from("out.iso"));
    }

    #[test]
    fn defaults_match_options_new() {
        let cli = Cli::parse_from(["mkksiso", "ks.cfg", "in.iso", "out.iso"]);
        assert_eq!(
            cli.into_options(),
            Options::new("ks.cfg", "in.iso", "out.iso")
        );
    }
}
