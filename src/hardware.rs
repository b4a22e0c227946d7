//! Hardware Recommendation Engine
//!
//! Classifies `lspci -nn` descriptor lines and maps detected devices to the
//! driver packages worth installing for them.
//!
//! # Rules
//!
//! | Device class | Vendor (first match) | Recommended |
//! |--------------|----------------------|-------------|
//! | VGA compatible controller, 3D controller | NVIDIA | `nvidia-driver` |
//! | | Intel | `xserver-xorg-video-intel` |
//! | | AMD, ATI | `xserver-xorg-video-amdgpu` |
//! | Ethernet controller, Network controller | Realtek | `firmware-realtek` |
//! | | Intel | `firmware-iwlwifi` |
//! | Audio device | any | `pulseaudio`, `alsa-base` |
//!
//! Matching is case-sensitive, as lspci prints vendor names in their
//! canonical spelling. Detection failure is never fatal: the probe error is
//! logged and the recommendation set is empty.

use crate::backend::HardwareProbe;
use std::collections::BTreeSet;
use tracing::{debug, info, warn};

/// Broad device class recognised on a descriptor line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum DeviceClass {
    /// VGA compatible controller or 3D controller
    Display,
    /// Ethernet controller or Network controller
    Network,
    /// Audio device
    Audio,
    Unknown,
}

impl DeviceClass {
    /// Class of a descriptor line; display wins over network wins over audio.
    pub fn detect(line: &str) -> Self {
        if line.contains("VGA compatible controller") || line.contains("3D controller") {
            Self::Display
        } else if line.contains("Ethernet controller") || line.contains("Network controller") {
            Self::Network
        } else if line.contains("Audio device") {
            Self::Audio
        } else {
            Self::Unknown
        }
    }
}

/// Hardware vendor recognised on a descriptor line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
pub enum Vendor {
    #[strum(serialize = "NVIDIA")]
    Nvidia,
    Intel,
    /// AMD or ATI
    #[strum(serialize = "AMD/ATI")]
    Amd,
    Realtek,
    Unknown,
}

impl Vendor {
    fn tokens(self) -> &'static [&'static str] {
        match self {
            Self::Nvidia => &["NVIDIA"],
            Self::Intel => &["Intel"],
            Self::Amd => &["AMD", "ATI"],
            Self::Realtek => &["Realtek"],
            Self::Unknown => &[],
        }
    }

    /// Vendor of a line, checked in the priority order of its device class.
    pub fn detect(line: &str, class: DeviceClass) -> Self {
        let priority: &[Vendor] = match class {
            DeviceClass::Display => &[Self::Nvidia, Self::Intel, Self::Amd],
            DeviceClass::Network => &[Self::Realtek, Self::Intel],
            DeviceClass::Audio | DeviceClass::Unknown => {
                &[Self::Nvidia, Self::Intel, Self::Amd, Self::Realtek]
            }
        };
        priority
            .iter()
            .copied()
            .find(|vendor| vendor.tokens().iter().any(|t| line.contains(t)))
            .unwrap_or(Self::Unknown)
    }
}

/// One parsed descriptor line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HardwareDevice {
    pub line: String,
    pub device_class: DeviceClass,
    pub vendor: Vendor,
}

impl HardwareDevice {
    pub fn parse(line: &str) -> Self {
        let device_class = DeviceClass::detect(line);
        let vendor = Vendor::detect(line, device_class);
        Self {
            line: line.to_string(),
            device_class,
            vendor,
        }
    }

    /// Packages recommended for this device (possibly none).
    pub fn recommended_packages(&self) -> &'static [&'static str] {
        match (self.device_class, self.vendor) {
            (DeviceClass::Display, Vendor::Nvidia) => &["nvidia-driver"],
            (DeviceClass::Display, Vendor::Intel) => &["xserver-xorg-video-intel"],
            (DeviceClass::Display, Vendor::Amd) => &["xserver-xorg-video-amdgpu"],
            (DeviceClass::Network, Vendor::Realtek) => &["firmware-realtek"],
            (DeviceClass::Network, Vendor::Intel) => &["firmware-iwlwifi"],
            (DeviceClass::Audio, _) => &["pulseaudio", "alsa-base"],
            _ => &[],
        }
    }
}

/// Parse every line of a hardware snapshot.
pub fn parse_devices<I, S>(lines: I) -> Vec<HardwareDevice>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    lines
        .into_iter()
        .map(|line| HardwareDevice::parse(line.as_ref()))
        .collect()
}

/// Recommendation set for a hardware snapshot.
pub fn recommend<I, S>(lines: I) -> BTreeSet<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut recommended = BTreeSet::new();
    for device in parse_devices(lines) {
        for package in device.recommended_packages() {
            if recommended.insert((*package).to_string()) {
                debug!(
                    "Recommending {} for {} {} device",
                    package, device.vendor, device.device_class
                );
            }
        }
    }
    recommended
}

/// Probe the hardware and compute recommendations.
///
/// Probe failure degrades to an empty set.
pub fn detect_recommendations(probe: &dyn HardwareProbe) -> BTreeSet<String> {
    match probe.enumerate() {
        Ok(lines) => {
            let recommended = recommend(&lines);
            info!(
                "Hardware detection: {} devices, {} recommended packages",
                lines.len(),
                recommended.len()
            );
            recommended
        }
        Err(e) => {
            warn!("Error detecting hardware: {}", e);
            BTreeSet::new()
        }
    }
}
