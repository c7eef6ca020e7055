//! List supported export formats.

use std::io::Write;

use anyhow::Result;
use rt_core::SourceFormat;

/// Print every format with its file slots.
pub fn run<W: Write>(writer: &mut W) -> Result<()> {
    for (idx, format) in SourceFormat::ALL.iter().enumerate() {
        if idx > 0 {
            writeln!(writer)?;
        }
        writeln!(writer, "{format}: {}", format.description())?;
        for slot in format.file_slots() {
            let required = if slot.required { "required" } else { "optional" };
            writeln!(writer, "  {:<14} {required:<9} {}", slot.name, slot.description)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lists_every_format_and_slot() {
        let mut output = Vec::new();
        run(&mut output).unwrap();
        let output = String::from_utf8(output).unwrap();

        for format in SourceFormat::ALL {
            assert!(output.contains(&format!("{format}: {}", format.description())));
            for slot in format.file_slots() {
                assert!(output.contains(slot.name), "missing slot {}", slot.name);
            }
        }
    }
}
