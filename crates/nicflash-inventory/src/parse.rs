//! Parsers for diagnostic tool output

/// Separator `fpgainfo bmc` prints between cards
pub const BMC_SECTION_SEPARATOR: &str = "//****** BMC SENSORS ******//";

const BMC_PCI_KEY: &str = "PCIe s:b:d.f";
const ETHTOOL_FIRMWARE_KEY: &str = "firmware-version";

/// Split a `key : value` line
///
/// The separator is the first colon followed by whitespace, so keys such as
/// `PCIe s:b:d.f` and values such as `0000:1b:00.0` survive intact.
#[must_use]
pub fn split_key_value(line: &str) -> Option<(&str, &str)> {
    let bytes = line.as_bytes();
    let idx = bytes
        .windows(2)
        .position(|w| w[0] == b':' && w[1].is_ascii_whitespace())?;

    let key = line[..idx].trim();
    let value = line[idx + 1..].trim();
    if key.is_empty() || value.is_empty() {
        return None;
    }
    Some((key, value))
}

/// Extract card PCI addresses from `fpgainfo bmc` output
///
/// Only the first `PCIe s:b:d.f` line of each section counts.
#[must_use]
pub fn parse_bmc_pci_addresses(output: &str) -> Vec<String> {
    output
        .split(BMC_SECTION_SEPARATOR)
        .filter_map(|section| {
            section
                .lines()
                .filter_map(split_key_value)
                .find(|(key, _)| *key == BMC_PCI_KEY)
                .map(|(_, value)| value.to_string())
        })
        .collect()
}

/// Extract the firmware version from `ethtool -i` output
#[must_use]
pub fn parse_ethtool_firmware_version(output: &str) -> Option<String> {
    output
        .lines()
        .filter_map(split_key_value)
        .find(|(key, _)| *key == ETHTOOL_FIRMWARE_KEY)
        .map(|(_, value)| value.to_string())
}

/// Extract the device name (fourth field) from `lspci -Dm` output
#[must_use]
pub fn parse_lspci_device_name(output: &str) -> Option<String> {
    let line = output.lines().find(|l| !l.trim().is_empty())?;
    split_quoted(line).into_iter().nth(3)
}

/// Split a line on whitespace, treating double-quoted runs as one field
fn split_quoted(line: &str) -> Vec<String> {
    let mut fields = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut in_field = false;

    for c in line.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                in_field = true;
            }
            c if c.is_whitespace() && !in_quotes => {
                if in_field {
                    fields.push(std::mem::take(&mut current));
                    in_field = false;
                }
            }
            c => {
                current.push(c);
                in_field = true;
            }
        }
    }
    if in_field {
        fields.push(current);
    }

    fields
}
