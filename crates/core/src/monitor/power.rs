use std::fs;
use std::path::{Path, PathBuf};

/// Power-source probe over sysfs (`/sys/class/power_supply`).
///
/// The projection is "charging or full": any battery supply reporting
/// `Charging`/`Full`, or any mains supply reporting online. Hosts without
/// the sysfs tree (or without any supply) report `false`.
#[derive(Debug)]
pub struct PowerSupplyProbe {
    root: PathBuf,
}

impl PowerSupplyProbe {
    pub fn new() -> Self {
        Self::with_root("/sys/class/power_supply")
    }

    /// Probe a different root. Used by tests to point at a fixture tree.
    pub fn with_root(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Sample the current "charging or full" state.
    pub fn is_charging(&self) -> bool {
        let Ok(entries) = fs::read_dir(&self.root) else {
            return false;
        };
        entries
            .flatten()
            .any(|entry| supply_is_charging(&entry.path()))
    }
}

impl Default for PowerSupplyProbe {
    fn default() -> Self {
        Self::new()
    }
}

fn supply_is_charging(dir: &Path) -> bool {
    // Battery-style supplies expose a status file.
    if let Ok(status) = fs::read_to_string(dir.join("status")) {
        let status = status.trim();
        if status == "Charging" || status == "Full" {
            return true;
        }
    }
    // Mains adapters expose type + online instead.
    let is_mains = fs::read_to_string(dir.join("type"))
        .map(|t| t.trim() == "Mains")
        .unwrap_or(false);
    if is_mains {
        return fs::read_to_string(dir.join("online"))
            .map(|o| o.trim() == "1")
            .unwrap_or(false);
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_supply(root: &Path, name: &str, files: &[(&str, &str)]) {
        let dir = root.join(name);
        fs::create_dir_all(&dir).unwrap();
        for (file, content) in files {
            fs::write(dir.join(file), content).unwrap();
        }
    }

    #[test]
    fn missing_root_reports_not_charging() {
        let probe = PowerSupplyProbe::with_root("/nonexistent/power_supply");
        assert!(!probe.is_charging());
    }

    #[test]
    fn charging_battery_detected() {
        let tmp = tempfile::tempdir().unwrap();
        write_supply(tmp.path(), "BAT0", &[("status", "Charging\n")]);
        let probe = PowerSupplyProbe::with_root(tmp.path());
        assert!(probe.is_charging());
    }

    #[test]
    fn full_battery_counts_as_charging() {
        let tmp = tempfile::tempdir().unwrap();
        write_supply(tmp.path(), "BAT0", &[("status", "Full\n")]);
        let probe = PowerSupplyProbe::with_root(tmp.path());
        assert!(probe.is_charging());
    }

    #[test]
    fn discharging_battery_not_charging() {
        let tmp = tempfile::tempdir().unwrap();
        write_supply(tmp.path(), "BAT0", &[("status", "Discharging\n")]);
        let probe = PowerSupplyProbe::with_root(tmp.path());
        assert!(!probe.is_charging());
    }

    #[test]
    fn online_mains_detected() {
        let tmp = tempfile::tempdir().unwrap();
        write_supply(tmp.path(), "AC", &[("type", "Mains\n"), ("online", "1\n")]);
        let probe = PowerSupplyProbe::with_root(tmp.path());
        assert!(probe.is_charging());
    }

    #[test]
    fn offline_mains_not_charging() {
        let tmp = tempfile::tempdir().unwrap();
        write_supply(tmp.path(), "AC", &[("type", "Mains\n"), ("online", "0\n")]);
        let probe = PowerSupplyProbe::with_root(tmp.path());
        assert!(!probe.is_charging());
    }

    #[test]
    fn any_charging_supply_wins() {
        let tmp = tempfile::tempdir().unwrap();
        write_supply(tmp.path(), "BAT0", &[("status", "Discharging\n")]);
        write_supply(tmp.path(), "AC", &[("type", "Mains\n"), ("online", "1\n")]);
        let probe = PowerSupplyProbe::with_root(tmp.path());
        assert!(probe.is_charging());
    }
}
