//! Platform classification and library-name mapping.
//!
//! The loader never inspects the host OS directly; everything it needs
//! is answered by a [`Platform`] value. [`Platform::host`] describes
//! the compiling target, and [`Platform::new`] builds arbitrary
//! descriptions for tests and cross-platform tooling.

use std::fmt;

/// Operating-system family, as far as library loading cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Os {
    Windows,
    /// Linux and other unix-likes that load `.so` files.
    Linux,
    Mac,
    Android,
    Ios,
    Unknown,
}

impl Os {
    /// Name of the per-OS fallback subtree inside the resource bundle.
    pub fn fallback_root(self) -> &'static str {
        match self {
            Os::Windows => "windows",
            Os::Linux => "linux",
            Os::Mac => "mac",
            Os::Android => "android",
            Os::Ios => "ios",
            Os::Unknown => "",
        }
    }
}

impl fmt::Display for Os {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Os::Windows => "Windows",
            Os::Linux => "Linux",
            Os::Mac => "Mac",
            Os::Android => "Android",
            Os::Ios => "iOS",
            Os::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Description of the platform a library is being loaded for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Platform {
    os: Os,
    bits64: bool,
    arm: bool,
    abi: String,
}

impl Platform {
    /// The platform this crate was compiled for.
    pub fn host() -> Self {
        let os = if cfg!(target_os = "windows") {
            Os::Windows
        } else if cfg!(target_os = "android") {
            Os::Android
        } else if cfg!(target_os = "ios") {
            Os::Ios
        } else if cfg!(target_os = "macos") {
            Os::Mac
        } else if cfg!(unix) {
            Os::Linux
        } else {
            Os::Unknown
        };

        Platform {
            os,
            bits64: cfg!(target_pointer_width = "64"),
            arm: cfg!(any(target_arch = "arm", target_arch = "aarch64")),
            abi: if cfg!(target_abi = "eabihf") {
                "hf".to_string()
            } else {
                String::new()
            },
        }
    }

    /// Build an arbitrary platform description.
    pub fn new(os: Os, bits64: bool, arm: bool, abi: impl Into<String>) -> Self {
        Platform {
            os,
            bits64,
            arm,
            abi: abi.into(),
        }
    }

    pub fn os(&self) -> Os {
        self.os
    }

    pub fn is_64bit(&self) -> bool {
        self.bits64
    }

    pub fn is_arm(&self) -> bool {
        self.arm
    }

    /// ABI label appended after `arm` in mapped unix filenames, e.g. `hf`.
    pub fn abi(&self) -> &str {
        &self.abi
    }

    /// Name of the per-OS fallback subtree inside the resource bundle.
    pub fn fallback_root(&self) -> &'static str {
        self.os.fallback_root()
    }

    /// Human-readable description used in load-failure messages.
    pub fn describe(&self) -> String {
        format!(
            "{}, {}",
            self.os,
            if self.bits64 { "64-bit" } else { "32-bit" }
        )
    }

    /// Map a platform-independent library name to the filename the
    /// platform expects.
    ///
    /// For the name `yoga` this yields `yoga.dll` / `yoga64.dll` on
    /// Windows, `libyoga.so` / `libyoga64.so` / `libyogaarmhf.so` on
    /// unix-likes, and `libyoga.dylib` / `libyoga64.dylib` on Mac. An
    /// unknown platform returns the name unchanged so callers can pass
    /// a fully-formed filename explicitly.
    pub fn map_library_name(&self, library_name: &str) -> String {
        let bits = if self.bits64 { "64" } else { "" };
        match self.os {
            Os::Windows => format!("{}{}.dll", library_name, bits),
            Os::Linux | Os::Android => {
                let arm = if self.arm {
                    format!("arm{}", self.abi)
                } else {
                    String::new()
                };
                format!("lib{}{}{}.so", library_name, arm, bits)
            }
            Os::Mac | Os::Ios => format!("lib{}{}.dylib", library_name, bits),
            Os::Unknown => library_name.to_string(),
        }
    }
}
