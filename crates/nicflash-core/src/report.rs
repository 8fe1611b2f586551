//! NVM update tool result file
//!
//! ```xml
//! <DeviceUpdate lang="en">
//!   <Instance vendor="8086" device="1592" subdevice="0" subvendor="8086" bus="27" dev="0" func="0">
//!     <Module type="NVM" version="0x8000a4ae" previous_version="0x80008b93">
//!       <Status result="Success" id="0">All operations completed successfully.</Status>
//!     </Module>
//!   </Instance>
//!   <NextUpdateAvailable> 0 </NextUpdateAvailable>
//! </DeviceUpdate>
//! ```

use serde::Deserialize;

/// Result string the tool uses for a module that updated cleanly
pub const SUCCESS_RESULT: &str = "Success";

#[derive(Debug, Deserialize)]
struct DeviceUpdateXml {
    #[serde(rename = "Instance", default)]
    instances: Vec<InstanceXml>,
    #[serde(rename = "NextUpdateAvailable", default)]
    next_update_available: Option<String>,
}

#[derive(Debug, Deserialize)]
struct InstanceXml {
    #[serde(rename = "Module", default)]
    modules: Vec<ModuleXml>,
}

#[derive(Debug, Deserialize)]
struct ModuleXml {
    #[serde(rename = "@type", default)]
    module_type: String,
    #[serde(rename = "@version", default)]
    version: String,
    #[serde(rename = "Status")]
    status: Option<StatusXml>,
}

#[derive(Debug, Deserialize)]
struct StatusXml {
    #[serde(rename = "@result", default)]
    result: String,
}

/// One module the tool reported a status for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleReport {
    pub module: String,
    pub version: String,
    pub result: String,
}

impl ModuleReport {
    #[must_use]
    pub fn succeeded(&self) -> bool {
        self.result == SUCCESS_RESULT
    }
}

/// Parsed result of one update pass
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateReport {
    pub modules: Vec<ModuleReport>,
    pub next_update_available: bool,
}

/// Parse the tool's result file
///
/// Modules without a `Status` element (or with an empty result) are left out.
///
/// # Errors
/// Returns the deserializer error for malformed XML.
pub fn parse_report(xml: &str) -> Result<UpdateReport, quick_xml::DeError> {
    let doc: DeviceUpdateXml = quick_xml::de::from_str(xml)?;

    let modules = doc
        .instances
        .into_iter()
        .flat_map(|i| i.modules)
        .filter_map(|m| {
            let status = m.status?;
            if status.result.is_empty() {
                return None;
            }
            Some(ModuleReport {
                module: m.module_type,
                version: m.version,
                result: status.result,
            })
        })
        .collect();

    let next_update_available = doc
        .next_update_available
        .is_some_and(|v| v.trim() == "1");

    Ok(UpdateReport {
        modules,
        next_update_available,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TWO_MODULES: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<DeviceUpdate lang="en">
  <Instance vendor="8086" device="1592" subdevice="0" subvendor="8086" bus="27" dev="0" func="0" PBA="K91258-000" port_id="Port 1 of 2" display="Intel(R) Ethernet Controller E810-C">
    <Module type="NVM" version="0x8000a4ae" previous_version="0x80008b93" display="">
      <Status result="Success" id="0">All operations completed successfully.</Status>
    </Module>
    <Module type="PXE" version="2.4.35" previous_version="2.4.35" display="">
    </Module>
    <Module type="EFI" version="1.3.60" previous_version="1.2.11" display="">
      <Status result="Success" id="0">All operations completed successfully.</Status>
    </Module>
    <VPD display="Vital Product Data"/>
  </Instance>
  <NextUpdateAvailable> 1 </NextUpdateAvailable>
  <RebootRequired> 0 </RebootRequired>
  <PowerCycleRequired> 1 </PowerCycleRequired>
</DeviceUpdate>
"#;

    #[test]
    fn test_parse_skips_modules_without_status() {
        let report = parse_report(TWO_MODULES).unwrap();

        assert_eq!(report.modules.len(), 2);
        assert_eq!(report.modules[0].module, "NVM");
        assert_eq!(report.modules[0].version, "0x8000a4ae");
        assert!(report.modules[0].succeeded());
        assert_eq!(report.modules[1].module, "EFI");
        assert!(report.next_update_available);
    }

    #[test]
    fn test_parse_failure_result() {
        let xml = r#"<DeviceUpdate>
  <Instance vendor="8086">
    <Module type="NVM" version="0x8000a4ae">
      <Status result="Fail" id="8">Update failed.</Status>
    </Module>
  </Instance>
  <NextUpdateAvailable>0</NextUpdateAvailable>
</DeviceUpdate>"#;

        let report = parse_report(xml).unwrap();

        assert_eq!(report.modules[0].result, "Fail");
        assert!(!report.modules[0].succeeded());
        assert!(!report.next_update_available);
    }

    #[test]
    fn test_parse_without_next_update_flag() {
        let report = parse_report("<DeviceUpdate><Instance/></DeviceUpdate>").unwrap();

        assert!(report.modules.is_empty());
        assert!(!report.next_update_available);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse_report("<DeviceUpdate><Instance>").is_err());
    }
}
