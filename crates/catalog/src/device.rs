//! Device records.

use crate::error::{CatalogError, CatalogResult};
use std::collections::BTreeSet;
use std::fmt::Write as _;

/// One device in the catalog.
///
/// The `online` flag is session state and is never persisted: every
/// device loads as offline.
#[derive(Clone, Debug, PartialEq)]
pub struct Device {
    pub user_id: String,
    pub device_id: String,
    pub online: bool,
    pub temperature: Option<f32>,
    pub image: Option<String>,
    pub domains: BTreeSet<String>,
}

impl Device {
    /// Create an offline device with no published data.
    pub fn new(user_id: impl Into<String>, device_id: impl Into<String>) -> Self {
        Self {
            user_id: user_id.into(),
            device_id: device_id.into(),
            online: false,
            temperature: None,
            image: None,
            domains: BTreeSet::new(),
        }
    }

    /// Composite `userId:devId` key.
    pub fn full_id(&self) -> String {
        corral_core::ident::full_id(&self.user_id, &self.device_id)
    }

    /// Render the snapshot line:
    /// `userId:devId:<temp|empty>:<image|empty>:<dom1,dom2,...>`.
    pub fn render_line(&self) -> String {
        let mut line = String::new();
        let _ = write!(line, "{}:{}:", self.user_id, self.device_id);
        if let Some(temp) = self.temperature {
            let _ = write!(line, "{temp}");
        }
        line.push(':');
        if let Some(image) = &self.image {
            line.push_str(image);
        }
        line.push(':');
        let mut first = true;
        for domain in &self.domains {
            if !first {
                line.push(',');
            }
            line.push_str(domain);
            first = false;
        }
        line
    }

    /// Parse a snapshot line.
    pub fn parse_line(line: &str, file: &str) -> CatalogResult<Self> {
        let corrupt = |detail: String| CatalogError::Corrupt {
            file: file.to_string(),
            detail,
        };

        let fields: Vec<&str> = line.split(':').collect();
        let [user_id, device_id, temp, image, domains] = fields.as_slice() else {
            return Err(corrupt(format!("bad device record: {line}")));
        };

        let temperature = if temp.is_empty() {
            None
        } else {
            Some(
                temp.parse::<f32>()
                    .map_err(|e| corrupt(format!("bad temperature {temp}: {e}")))?,
            )
        };

        let image = if image.is_empty() {
            None
        } else {
            Some((*image).to_string())
        };

        let domains = domains
            .split(',')
            .filter(|d| !d.is_empty())
            .map(str::to_string)
            .collect();

        Ok(Self {
            user_id: (*user_id).to_string(),
            device_id: (*device_id).to_string(),
            online: false,
            temperature,
            image,
            domains,
        })
    }
}
