//! Producer subsystem tags.

use core::fmt;

/// Driver subsystem that owns a metric or emitted an event
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(u8)]
pub enum Subsystem {
    /// Core driver framework
    #[default]
    Core    = 0,
    /// PCIe bus
    Pci     = 1,
    /// USB and Thunderbolt
    Usb     = 2,
    /// NVMe storage
    Nvme    = 3,
    /// Input devices
    Input   = 4,
    /// ACPI power and thermal management
    Acpi    = 5,
    /// Hot-plug detection
    Hotplug = 6,
    /// Network drivers
    Network = 7,
    /// Audio drivers
    Audio   = 8,
    /// Graphics drivers
    Gpu     = 9,
}

impl Subsystem {
    /// Number of subsystem tags
    pub const COUNT: usize = 10;

    /// Every tag, in declaration order
    pub const ALL: [Subsystem; Self::COUNT] = [
        Subsystem::Core,
        Subsystem::Pci,
        Subsystem::Usb,
        Subsystem::Nvme,
        Subsystem::Input,
        Subsystem::Acpi,
        Subsystem::Hotplug,
        Subsystem::Network,
        Subsystem::Audio,
        Subsystem::Gpu,
    ];

    /// Short lowercase name
    pub const fn name(self) -> &'static str {
        match self {
            Subsystem::Core => "core",
            Subsystem::Pci => "pci",
            Subsystem::Usb => "usb",
            Subsystem::Nvme => "nvme",
            Subsystem::Input => "input",
            Subsystem::Acpi => "acpi",
            Subsystem::Hotplug => "hotplug",
            Subsystem::Network => "network",
            Subsystem::Audio => "audio",
            Subsystem::Gpu => "gpu",
        }
    }
}

impl fmt::Display for Subsystem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
