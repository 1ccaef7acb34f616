//! Thin `clap`-builder argument definitions for the two Filebox binaries.
//!
//! Kept deliberately small: the CLI surface is an external collaborator,
//! not one of the core subsystems, so it recognises exactly the flags the
//! design calls for and nothing more. Built with `clap`'s builder API
//! (`Command`/`Arg`), matching how the teacher's own `cli` crate constructs
//! its command line rather than a derive macro.

use std::ffi::OsString;
use std::path::PathBuf;

use clap::{Arg, ArgAction, Command};

/// Export a directory over the Filebox protocol.
#[derive(Debug)]
pub struct ServerArgs {
    /// Directory to export.
    pub path: PathBuf,
    /// TCP port to listen on.
    pub port: u16,
    /// Verbose mode (debug-level logging).
    pub verbose: bool,
}

impl ServerArgs {
    /// Parse from the real process arguments, exiting the process on error.
    pub fn parse() -> Self {
        Self::parse_from(std::env::args_os())
    }

    /// Parse from an explicit argument list, exiting the process on error.
    pub fn parse_from<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        match Self::try_parse_from(args) {
            Ok(args) => args,
            Err(err) => err.exit(),
        }
    }

    /// Parse from an explicit argument list, reporting failure rather than exiting.
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = server_command().try_get_matches_from(args)?;
        Ok(ServerArgs {
            path: matches
                .get_one::<PathBuf>("path")
                .cloned()
                .expect("path is required"),
            port: *matches.get_one::<u16>("port").expect("port is required"),
            verbose: matches.get_flag("verbose"),
        })
    }
}

fn server_command() -> Command {
    Command::new("filebox-server")
        .about("Filebox server: exports a directory over TCP")
        .arg(
            Arg::new("path")
                .short('d')
                .long("path")
                .value_name("DIR")
                .help("Directory to export.")
                .required(true)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .value_name("PORT")
                .help("TCP port to listen on.")
                .required(true)
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Verbose mode (debug-level logging).")
                .action(ArgAction::SetTrue),
        )
}

/// Mount a remote Filebox export locally.
#[derive(Debug)]
pub struct ClientArgs {
    /// Remote address of the Filebox server, e.g. `192.168.1.10:8763`.
    pub address: String,
    /// Local path to mount the remote directory at.
    pub mountpoint: PathBuf,
    /// Verbose mode (debug-level logging).
    pub verbose: bool,
}

impl ClientArgs {
    /// Parse from the real process arguments, exiting the process on error.
    pub fn parse() -> Self {
        Self::parse_from(std::env::args_os())
    }

    /// Parse from an explicit argument list, exiting the process on error.
    pub fn parse_from<I, T>(args: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        match Self::try_parse_from(args) {
            Ok(args) => args,
            Err(err) => err.exit(),
        }
    }

    /// Parse from an explicit argument list, reporting failure rather than exiting.
    pub fn try_parse_from<I, T>(args: I) -> Result<Self, clap::Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matches = client_command().try_get_matches_from(args)?;
        Ok(ClientArgs {
            address: matches
                .get_one::<String>("address")
                .cloned()
                .expect("address is required"),
            mountpoint: matches
                .get_one::<PathBuf>("mountpoint")
                .cloned()
                .expect("mountpoint is required"),
            verbose: matches.get_flag("verbose"),
        })
    }
}

fn client_command() -> Command {
    Command::new("filebox-client")
        .about("Filebox client: mounts a remote export via FUSE")
        .arg(
            Arg::new("address")
                .short('r')
                .long("address")
                .value_name("HOST:PORT")
                .help("Remote address of the Filebox server, e.g. 192.168.1.10:8763.")
                .required(true),
        )
        .arg(
            Arg::new("mountpoint")
                .short('m')
                .long("mountpoint")
                .value_name("DIR")
                .help("Local path to mount the remote directory at.")
                .required(true)
                .value_parser(clap::value_parser!(PathBuf)),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .help("Verbose mode (debug-level logging).")
                .action(ArgAction::SetTrue),
        )
}
