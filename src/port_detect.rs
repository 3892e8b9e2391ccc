use glob::glob;

pub const PORT_HINT_ENV: &str = "GROUNDLINK_PORT_HINT";

const PATTERNS: &[&str] = &[
    "/dev/cu.usbserial*",
    "/dev/cu.usbmodem*",
    "/dev/cu.SLAB_USBtoUART*",
    "/dev/cu.wchusbserial*",
    "/dev/tty.usbserial*",
    "/dev/tty.usbmodem*",
    "/dev/ttyUSB*",
    "/dev/ttyACM*",
];

fn collect_candidates() -> Vec<String> {
    let mut out = Vec::new();
    let mut add = |path: String| {
        if !out.iter().any(|existing| existing == &path) {
            out.push(path);
        }
    };
    for pattern in PATTERNS {
        let Ok(entries) = glob(pattern) else {
            continue;
        };
        for entry in entries.flatten() {
            add(entry.display().to_string());
        }
    }
    // Picks up COM ports, which have no device node to glob for.
    if let Ok(ports) = serialport::available_ports() {
        for port in ports {
            add(port.port_name);
        }
    }
    out
}

/// Picks a single port out of the candidates, honouring the hint variable.
/// Returns `None` unless exactly one port matches in some family.
pub fn pick_port(mut candidates: Vec<String>, hint: Option<&str>) -> Option<String> {
    if let Some(hint) = hint.filter(|h| !h.trim().is_empty()) {
        candidates.retain(|c| c.contains(hint));
    }

    let families: [fn(&str) -> bool; 3] = [
        |c| c.starts_with("/dev/cu."),
        |c| c.starts_with("/dev/ttyUSB") || c.starts_with("/dev/ttyACM"),
        |c| c.starts_with("COM"),
    ];
    for family in families {
        let mut matching = candidates.iter().filter(|c| family(c.as_str()));
        if let (Some(only), None) = (matching.next(), matching.next()) {
            return Some(only.clone());
        }
    }

    if candidates.len() == 1 {
        return candidates.into_iter().next();
    }
    None
}

pub fn detect_port() -> Option<String> {
    let hint = std::env::var(PORT_HINT_ENV).ok();
    pick_port(collect_candidates(), hint.as_deref())
}

pub fn list_candidates() -> Vec<String> {
    collect_candidates()
}
