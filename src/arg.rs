use std::path::PathBuf;
use std::str::FromStr;

use clap::{
    App,
    Arg,
    ArgMatches,
    Error,
    ErrorKind,
};
use mime::Mime;

/// Runtime configuration of the gateway.
#[derive(Clone, Debug)]
pub struct Settings {
    pub host: String,
    pub port: u16,
    /// Storage root handed to the directory-backed provider.
    pub storage: PathBuf,
    /// Extension overrides for content types, applied over the builtin table.
    pub mime_types: Vec<(String, Mime)>,
    /// Put failure details in the body of 500 responses.
    pub expose_errors: bool,
    /// Number of requests served at the same time.
    pub workers: usize,
}

const BIND_HOST: &str = "0.0.0.0";
/// DRIV on a phone dial pad.
pub const BIND_PORT: u16 = 3748;
const STORAGE_DIR: &str = "./storage";
const WORKERS: usize = 16;

fn parse_mime_override(s: &str) -> Result<(String, Mime), String> {
    let mut parts = s.splitn(2, '=');
    let ext = parts.next().unwrap_or("").trim();
    let typ = parts.next().unwrap_or("").trim();
    if ext.is_empty() || typ.is_empty() {
        return Err(format!("expected EXT=TYPE, got {:?}", s));
    }
    match Mime::from_str(typ) {
        Ok(v) => Ok((ext.to_string(), v)),
        Err(e) => Err(format!("invalid content type {:?}: {}", typ, e)),
    }
}

impl Settings {

    pub fn new() -> Settings {
        Settings {
            host: BIND_HOST.to_string(),
            port: BIND_PORT,
            storage: PathBuf::from(STORAGE_DIR),
            mime_types: vec!(),
            expose_errors: false,
            workers: WORKERS,
        }
    }

    fn bind_from_args(&mut self, arg: &ArgMatches) -> Result<(), Error> {
        if let Some(v) = arg.value_of("host") {
            self.host = v.to_string();
        }

        if let Some(v) = arg.value_of("port") {
            self.port = match u16::from_str_radix(v, 10) {
                Ok(p) => p,
                Err(e) => {
                    let s = format!("invalid port {:?}: {}", v, e);
                    return Err(Error::with_description(&s, ErrorKind::InvalidValue));
                },
            };
        }

        if let Some(v) = arg.value_of("storage") {
            self.storage = PathBuf::from(v);
        }

        if let Some(vs) = arg.values_of("mime") {
            for v in vs {
                match parse_mime_override(v) {
                    Ok(m) => {
                        self.mime_types.push(m);
                    },
                    Err(s) => {
                        return Err(Error::with_description(&s, ErrorKind::InvalidValue));
                    },
                }
            }
        }

        if let Some(v) = arg.value_of("workers") {
            self.workers = match usize::from_str(v) {
                Ok(n) if n > 0 => n,
                _ => {
                    let s = format!("invalid worker count {:?}", v);
                    return Err(Error::with_description(&s, ErrorKind::InvalidValue));
                },
            };
        }

        self.expose_errors = arg.is_present("verbose_errors");
        Ok(())
    }

    fn app<'a, 'b>() -> App<'a, 'b> {
        let mut o = App::new("drivegate");
        o = o.version(env!("CARGO_PKG_VERSION"));
        o = o.about("HTTP gateway to versioned content-addressed drives");
        o = o.arg(
            Arg::with_name("host")
                .long("host")
                .short("h")
                .value_name("Host or ip to bind server to.")
                .takes_value(true)
                );
        o = o.arg(
            Arg::with_name("port")
                .long("port")
                .short("p")
                .value_name("Port to bind server to")
                .takes_value(true)
                );
        o = o.arg(
            Arg::with_name("storage")
                .long("storage")
                .short("s")
                .value_name("Storage directory holding the drives")
                .takes_value(true)
                );
        o = o.arg(
            Arg::with_name("mime")
                .long("mime")
                .value_name("EXT=TYPE")
                .help("Serve files with extension EXT as TYPE")
                .takes_value(true)
                .multiple(true)
                .number_of_values(1)
                );
        o = o.arg(
            Arg::with_name("workers")
                .long("workers")
                .short("w")
                .value_name("Number of requests served concurrently")
                .takes_value(true)
                );
        o = o.arg(
            Arg::with_name("verbose_errors")
                .long("verbose-errors")
                .help("Include failure details in error responses")
                );
        o
    }

    /// Parse `args`, which include the program name.
    pub fn from_arg_list<I, T>(args: I) -> Result<Settings, Error>
    where
        I: IntoIterator<Item = T>,
        T: Into<std::ffi::OsString> + Clone,
    {
        let arg_matches = Settings::app().get_matches_from_safe(args)?;
        let mut settings = Settings::new();
        settings.bind_from_args(&arg_matches)?;
        Ok(settings)
    }

    /// Settings from the process command line. Exits with a usage message on invalid input.
    pub fn from_args() -> Settings {
        match Settings::from_arg_list(std::env::args_os()) {
            Ok(v) => v,
            Err(e) => e.exit(),
        }
    }
}

impl Default for Settings {
    fn default() -> Settings {
        Settings::new()
    }
}
