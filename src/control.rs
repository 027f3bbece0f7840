//! Control panel plumbing.
//!
//! Everything that wants to change a parameter (key bindings, the stdin
//! console, the browser panel) produces [`ParamUpdate`]s. Updates coming from
//! other threads go through a [`ControlChannel`] and are drained by the frame
//! thread at the start of each tick, so the parameter record keeps a single
//! writer.

use std::sync::mpsc::{self, Receiver, Sender};

use anyhow::{anyhow, bail, Result};

use crate::params::{hex_color, ParamId, ParamKind, ParamSurface, ParamUpdate, ParamValue};

/// Parse a raw value for `id` according to its kind.
pub fn parse_value(id: ParamId, raw: &str) -> Result<ParamValue> {
    let raw = raw.trim();
    match id.def().kind {
        ParamKind::Float { .. } => {
            let v: f32 = raw
                .parse()
                .map_err(|_| anyhow!("'{}' is not a number (for {})", raw, id))?;
            Ok(ParamValue::Float(v))
        }
        ParamKind::Bool => match raw.to_ascii_lowercase().as_str() {
            "true" | "on" | "yes" | "1" => Ok(ParamValue::Bool(true)),
            "false" | "off" | "no" | "0" => Ok(ParamValue::Bool(false)),
            _ => bail!("'{}' is not a boolean (for {})", raw, id),
        },
        ParamKind::Color => hex_color::parse(raw)
            .map(ParamValue::Color)
            .ok_or_else(|| anyhow!("'{}' is not a #rrggbb colour (for {})", raw, id)),
    }
}

/// Parse `name=value` (or `name value`).
pub fn parse_assignment(line: &str) -> Result<ParamUpdate> {
    let line = line.trim();
    let (name, raw) = line
        .split_once('=')
        .or_else(|| line.split_once(char::is_whitespace))
        .ok_or_else(|| anyhow!("expected name=value, got '{}'", line))?;
    let name = name.trim();
    let id = ParamId::from_name(name).ok_or_else(|| anyhow!("unknown parameter '{}'", name))?;
    Ok(ParamUpdate::new(id, parse_value(id, raw)?))
}

/// Flip a boolean parameter.
pub fn toggle(surface: &ParamSurface, id: ParamId) -> Option<ParamUpdate> {
    match surface.get(id) {
        ParamValue::Bool(v) => Some(ParamUpdate::new(id, ParamValue::Bool(!v))),
        _ => None,
    }
}

/// Step a float parameter; the surface clamps the result.
pub fn nudge(surface: &ParamSurface, id: ParamId, delta: f32) -> Option<ParamUpdate> {
    match surface.get(id) {
        ParamValue::Float(v) => Some(ParamUpdate::new(id, ParamValue::Float(v + delta))),
        _ => None,
    }
}

/// Human readable parameter table (`params` command, console `help`).
pub fn describe_params(surface: &ParamSurface) -> String {
    let mut out = String::new();
    for id in ParamId::ALL {
        let def = id.def();
        let range = match def.kind {
            ParamKind::Float { min, max } => format!("[{}, {}]", min, max),
            ParamKind::Bool => "on/off".to_string(),
            ParamKind::Color => "#rrggbb".to_string(),
        };
        out.push_str(&format!(
            "  {:<18} {:<10} {:<12} {}\n",
            id.name(),
            surface.get(id).to_string(),
            range,
            def.label
        ));
    }
    out
}

// ============================================================================
// Cross-thread channel
// ============================================================================

/// Multi-producer queue of pending parameter updates.
pub struct ControlChannel {
    tx: Sender<ParamUpdate>,
    rx: Receiver<ParamUpdate>,
}

impl Default for ControlChannel {
    fn default() -> Self {
        Self::new()
    }
}

impl ControlChannel {
    pub fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self { tx, rx }
    }

    /// Handle for producer threads.
    pub fn sender(&self) -> Sender<ParamUpdate> {
        self.tx.clone()
    }

    /// Everything queued so far, oldest first. Never blocks.
    pub fn drain(&self) -> Vec<ParamUpdate> {
        self.rx.try_iter().collect()
    }
}

/// Read `name=value` lines from stdin and forward them.
///
/// The thread exits when stdin closes or the receiving side is dropped.
#[cfg(not(target_arch = "wasm32"))]
pub fn spawn_console(sender: Sender<ParamUpdate>) -> std::io::Result<std::thread::JoinHandle<()>> {
    use std::io::BufRead;

    std::thread::Builder::new()
        .name("param-console".to_string())
        .spawn(move || {
            let stdin = std::io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                let line = line.trim();
                if line.is_empty() {
                    continue;
                }
                if line == "help" || line == "?" {
                    println!("Set a parameter with name=value. Parameters:");
                    println!("{}", describe_params(&ParamSurface::default()));
                    continue;
                }
                match parse_assignment(line) {
                    Ok(update) => {
                        if sender.send(update).is_err() {
                            break;
                        }
                    }
                    Err(e) => log::warn!("{}", e),
                }
            }
            log::debug!("Parameter console closed");
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_assignment_forms() {
        let update = parse_assignment("bloom_strength=2.5").unwrap();
        assert_eq!(update.id, ParamId::BloomStrength);
        assert_eq!(update.value, ParamValue::Float(2.5));

        let update = parse_assignment("  bloom_enabled off ").unwrap();
        assert_eq!(update.value, ParamValue::Bool(false));

        let update = parse_assignment("disk_color=#ffffff").unwrap();
        assert_eq!(update.value, ParamValue::Color([1.0, 1.0, 1.0]));
    }

    #[test]
    fn test_parse_errors() {
        assert!(parse_assignment("gravity=9.8").is_err());
        assert!(parse_assignment("bloom_strength=lots").is_err());
        assert!(parse_assignment("stars_visible=maybe").is_err());
        assert!(parse_assignment("bloom_strength").is_err());
    }

    #[test]
    fn test_toggle_and_nudge() {
        let surface = ParamSurface::default();
        assert_eq!(
            toggle(&surface, ParamId::StarsVisible),
            Some(ParamUpdate::new(ParamId::StarsVisible, ParamValue::Bool(false)))
        );
        assert_eq!(toggle(&surface, ParamId::BloomStrength), None);
        let up = nudge(&surface, ParamId::DiskSpeed, 0.1).unwrap();
        match up.value {
            ParamValue::Float(v) => assert!((v - 0.3).abs() < 1e-6),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_channel_preserves_order() {
        let channel = ControlChannel::new();
        let tx = channel.sender();
        std::thread::spawn(move || {
            for v in [0.1, 0.2, 0.3] {
                tx.send(ParamUpdate::new(ParamId::BloomRadius, ParamValue::Float(v))).unwrap();
            }
        })
        .join()
        .unwrap();
        let drained: Vec<_> = channel.drain().into_iter().map(|u| u.value).collect();
        assert_eq!(
            drained,
            vec![ParamValue::Float(0.1), ParamValue::Float(0.2), ParamValue::Float(0.3)]
        );
        assert!(channel.drain().is_empty());
    }

    #[test]
    fn test_describe_lists_every_param() {
        let table = describe_params(&ParamSurface::default());
        for id in ParamId::ALL {
            assert!(table.contains(id.name()));
        }
    }
}
