//! Locating sections of the running executable in memory.

use elfsight_elf::{ElfFile, SegmentType};

use crate::error::GuardError;
use crate::protection::Region;

/// Difference between run-time and link-time addresses of `elf`, given the
/// run-time address of its program header table.
///
/// Uses `PT_PHDR` when present and otherwise the `PT_LOAD` that maps
/// `e_phoff`, as statically linked executables often lack `PT_PHDR`.
#[must_use]
pub fn load_bias(elf: &ElfFile<'_>, phdr_runtime: u64) -> Option<u64> {
    if phdr_runtime == 0 {
        return None;
    }
    if let Some(phdr) = elf
        .program_headers()
        .iter()
        .find(|p| p.p_type == SegmentType::Phdr)
    {
        return Some(phdr_runtime.wrapping_sub(phdr.p_vaddr));
    }
    let phoff = elf.header().e_phoff;
    elf.load_segments()
        .find(|p| phoff >= p.p_offset && phoff - p.p_offset < p.p_filesz)
        .map(|p| phdr_runtime.wrapping_sub(p.p_vaddr + (phoff - p.p_offset)))
}

/// The executable of the current process, parsed from disk and placed at
/// its load address.
#[derive(Debug)]
pub struct ProcessImage {
    elf: ElfFile<'static>,
    bias: u64,
}

impl ProcessImage {
    /// Parses `/proc/self/exe` and computes the load bias from the
    /// auxiliary vector's `AT_PHDR`.
    ///
    /// # Errors
    ///
    /// [`GuardError::Image`] if the executable cannot be read or parsed,
    /// [`GuardError::UnsupportedRegion`] if its program headers cannot be
    /// located in memory.
    #[cfg(target_os = "linux")]
    pub fn current() -> Result<Self, GuardError> {
        let elf = ElfFile::open("/proc/self/exe")?;
        // SAFETY: getauxval only reads the auxiliary vector.
        let phdr = unsafe { libc::getauxval(libc::AT_PHDR) };
        Self::from_parts(elf, u64::from(phdr))
    }

    /// Non-Linux platforms have no portable way to find the running image.
    ///
    /// # Errors
    ///
    /// Always [`GuardError::UnsupportedPlatform`].
    #[cfg(not(target_os = "linux"))]
    pub fn current() -> Result<Self, GuardError> {
        Err(GuardError::UnsupportedPlatform)
    }

    /// Places an already parsed image whose program headers live at
    /// `phdr_runtime`.
    ///
    /// # Errors
    ///
    /// [`GuardError::UnsupportedRegion`] if the program headers are not
    /// covered by the image's segments.
    pub fn from_parts(elf: ElfFile<'static>, phdr_runtime: u64) -> Result<Self, GuardError> {
        let bias = load_bias(&elf, phdr_runtime).ok_or(GuardError::UnsupportedRegion(
            "cannot locate the program headers in memory",
        ))?;
        Ok(Self { elf, bias })
    }

    /// The parsed executable.
    #[must_use]
    pub fn elf(&self) -> &ElfFile<'static> {
        &self.elf
    }

    /// Run-time address minus link-time address.
    #[must_use]
    pub fn load_bias(&self) -> u64 {
        self.bias
    }

    /// Live address range of the allocated section `name`.
    ///
    /// # Errors
    ///
    /// [`GuardError::SectionNotFound`] if there is no such section or it is
    /// not loaded into memory.
    pub fn section_region(&self, name: &str) -> Result<Region, GuardError> {
        let section = self
            .elf
            .section_by_name(name)
            .filter(|s| s.is_alloc())
            .ok_or_else(|| GuardError::SectionNotFound(name.to_owned()))?;
        let start = section.sh_addr.wrapping_add(self.bias);
        let start = usize::try_from(start)
            .map_err(|_| GuardError::UnsupportedRegion("section address exceeds usize"))?;
        let len = usize::try_from(section.sh_size)
            .map_err(|_| GuardError::UnsupportedRegion("section size exceeds usize"))?;
        Ok(Region::new(start, len))
    }
}
