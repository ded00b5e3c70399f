//! File-drop advertiser for hosts running the Avahi daemon.
//!
//! Avahi watches `/etc/avahi/services` and publishes every `*.service` file it
//! finds there over mDNS.  This backend writes one `service-group` file per
//! published service and unlinks it again on removal:
//!
//! ```xml
//! <?xml version="1.0" standalone='no'?><!--*-nxml-*-->
//! <!DOCTYPE service-group SYSTEM "avahi-service.dtd">
//! <service-group>
//!   <name replace-wildcards="yes">Roomba Controller</name>
//!   <service>
//!     <type>_roomba._tcp</type>
//!     <port>1444</port>
//!   </service>
//! </service-group>
//! ```
//!
//! Files are written under a temporary name and renamed into place, so the
//! daemon never parses a half-written file.  Name collisions are resolved by
//! Avahi itself.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use relay_core::{AdvertisementId, ServiceDescriptor};
use tracing::{debug, info, warn};

use crate::application::advertise::{AdvertiseError, ServiceAdvertiser};

/// Directory the Avahi daemon loads static service files from.
pub const AVAHI_SERVICE_DIR: &str = "/etc/avahi/services";

/// Writes Avahi service files into a watched directory.
#[derive(Debug)]
pub struct FileDropAdvertiser {
    dir: PathBuf,
    initialized: bool,
    files: HashMap<AdvertisementId, PathBuf>,
}

impl FileDropAdvertiser {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            initialized: false,
            files: HashMap::new(),
        }
    }

    /// Path of the file backing `id`, if it is published.
    pub fn service_file(&self, id: AdvertisementId) -> Option<&Path> {
        self.files.get(&id).map(PathBuf::as_path)
    }

    fn io_error(path: &Path) -> impl FnOnce(std::io::Error) -> AdvertiseError + '_ {
        move |source| AdvertiseError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

impl ServiceAdvertiser for FileDropAdvertiser {
    fn initialize(&mut self) -> Result<(), AdvertiseError> {
        if self.initialized {
            return Err(AdvertiseError::AlreadyInitialized);
        }
        match fs::metadata(&self.dir) {
            Ok(meta) if meta.is_dir() => {}
            _ => return Err(AdvertiseError::ServiceDir(self.dir.clone())),
        }
        self.initialized = true;
        debug!(dir = %self.dir.display(), "service file directory ready");
        Ok(())
    }

    fn shutdown(&mut self) {
        for (_, path) in self.files.drain() {
            if let Err(e) = fs::remove_file(&path) {
                warn!(path = %path.display(), "failed to remove service file: {e}");
            }
        }
        self.initialized = false;
    }

    fn add_service(
        &mut self,
        service: &ServiceDescriptor,
    ) -> Result<AdvertisementId, AdvertiseError> {
        if !self.initialized {
            return Err(AdvertiseError::NotInitialized);
        }
        if service.name.is_empty() || service.service_type.is_empty() {
            return Err(AdvertiseError::InvalidDescriptor(
                "name and service type must not be empty".to_string(),
            ));
        }

        let id = AdvertisementId::new();
        let path = self.dir.join(format!("roomba-relay-{}.service", id.simple()));
        let staging = path.with_extension("tmp");
        fs::write(&staging, render_service_file(service)).map_err(Self::io_error(&staging))?;
        if let Err(e) = fs::rename(&staging, &path) {
            let _ = fs::remove_file(&staging);
            return Err(Self::io_error(&path)(e));
        }

        info!(path = %path.display(), name = %service.name, "service file written");
        self.files.insert(id, path);
        Ok(id)
    }

    fn remove_service(&mut self, id: AdvertisementId) -> Result<(), AdvertiseError> {
        if !self.initialized {
            return Err(AdvertiseError::NotInitialized);
        }
        let path = self
            .files
            .remove(&id)
            .ok_or(AdvertiseError::UnknownService(id))?;
        fs::remove_file(&path).map_err(Self::io_error(&path))?;
        debug!(path = %path.display(), "service file removed");
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}

impl Drop for FileDropAdvertiser {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Renders the Avahi `service-group` document for `service`.
pub fn render_service_file(service: &ServiceDescriptor) -> String {
    let mut xml = String::from(
        "<?xml version=\"1.0\" standalone='no'?><!--*-nxml-*-->\n\
         <!DOCTYPE service-group SYSTEM \"avahi-service.dtd\">\n\
         <service-group>\n",
    );
    let _ = writeln!(
        xml,
        "  <name replace-wildcards=\"yes\">{}</name>",
        xml_escape(&service.name)
    );
    xml.push_str("  <service>\n");
    let _ = writeln!(xml, "    <type>{}</type>", xml_escape(&service.service_type));
    if let Some(domain) = &service.domain {
        let _ = writeln!(xml, "    <domain-name>{}</domain-name>", xml_escape(domain));
    }
    if let Some(host) = &service.host {
        let _ = writeln!(xml, "    <host-name>{}</host-name>", xml_escape(host));
    }
    let _ = writeln!(xml, "    <port>{}</port>", service.port);
    if let Some(metadata) = &service.metadata {
        let _ = writeln!(xml, "    <txt-record>{}</txt-record>", xml_escape(metadata));
    }
    xml.push_str("  </service>\n</service-group>\n");
    xml
}

/// Escapes the five XML special characters.
fn xml_escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            other => out.push(other),
        }
    }
    out
}

// ── Tests ─────────────────────────────────────────────────────────────────────
