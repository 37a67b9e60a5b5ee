//! Content types of served files are picked from the file extension only. The content itself is
//! never inspected.
//!
//! The standard registry is [mime_guess]'s. Extensions used by small-web documents that the
//! registry does not know are added on top: `gmi` and `gemini` as `text/gemini`, `org` as
//! `text/org`. More can be added at startup with `--mime`.
use std::collections::HashMap;
use std::str::FromStr;

use mime::Mime;

/// Extension lookup table.
#[derive(Clone, Debug)]
pub struct ContentTypes {
    overrides: HashMap<String, Mime>,
}

impl ContentTypes {

    pub fn new() -> ContentTypes {
        let mut o = ContentTypes {
            overrides: HashMap::new(),
        };
        let gemini = Mime::from_str("text/gemini").unwrap_or(mime::TEXT_PLAIN);
        let org = Mime::from_str("text/org").unwrap_or(mime::TEXT_PLAIN);
        o.define("gmi", gemini.clone());
        o.define("gemini", gemini);
        o.define("org", org);
        o
    }

    /// Map `ext` to `typ`, replacing any earlier mapping or registry value.
    pub fn define(&mut self, ext: &str, typ: Mime) {
        let k = ext.trim_start_matches('.').to_ascii_lowercase();
        self.overrides.insert(k, typ);
    }

    /// Content type for the file at `path`. `application/octet-stream` when nothing matches.
    pub fn resolve(&self, path: &str) -> Mime {
        // text after the last dot of the file name, which may be all of it, as in `.md`
        let name = path.rsplit('/').next().unwrap_or(path);
        let ext = name
            .rsplit_once('.')
            .map(|(_, v)| v)
            .filter(|v| !v.is_empty())
            .map(|v| v.to_ascii_lowercase());
        if let Some(ext) = ext {
            if let Some(v) = self.overrides.get(&ext) {
                return v.clone();
            }
            return mime_guess::from_ext(&ext).first_or_octet_stream();
        }
        mime::APPLICATION_OCTET_STREAM
    }
}

impl Default for ContentTypes {
    fn default() -> ContentTypes {
        ContentTypes::new()
    }
}
