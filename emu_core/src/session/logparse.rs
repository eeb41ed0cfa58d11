//! # Debug-Log Parser
//!
//! Session-backend runs dump a register trace after every `REG` command;
//! since several may appear in one log (e.g. once per breakpoint hit in a
//! loop), the convention is to report state as of the final occurrence
//! (§4.6). A log with no register dump at all is not an error: it means
//! the backend never reached the point it was asked to observe, and the
//! caller decides whether that is a problem.

use regex::Regex;

use crate::registers::RegisterFile;

/// Matches one `REG` dump line, e.g.:
/// `EAX=0000FFFF EBX=00000000 ECX=... EDX=... ESI=... EDI=... EBP=... ESP=...`
fn register_line_regex() -> Regex {
    Regex::new(r"(?i)\b([A-Z]{2,5})=([0-9A-F]{1,8})\b").expect("valid regex")
}

/// Scans forward from the final `EAX=` occurrence in the log and parses
/// every `NAME=HEXVALUE` token on that line and the lines immediately
/// following it, until a blank line or a line with no matching tokens ends
/// the block.
pub fn parse_final_registers(log: &str) -> Option<RegisterFile> {
    let lines: Vec<&str> = log.lines().collect();
    let anchor = lines.iter().rposition(|line| line.to_uppercase().contains("EAX="))?;

    let re = register_line_regex();
    let mut regs = RegisterFile::default();
    let mut found_any = false;

    for line in &lines[anchor..] {
        let mut matched_this_line = false;
        for caps in re.captures_iter(line) {
            let name = caps[1].to_lowercase();
            if let Ok(value) = u32::from_str_radix(&caps[2], 16) {
                if is_known_register(&name) {
                    regs.set_by_name(&name, value);
                    matched_this_line = true;
                    found_any = true;
                }
            }
        }
        if !matched_this_line && found_any {
            break;
        }
    }

    found_any.then_some(regs)
}

fn is_known_register(name: &str) -> bool {
    RegisterFile::GP_ORDER.contains(&name) || RegisterFile::SEG_ORDER.contains(&name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_single_register_block() {
        let log = "Booting...\nEAX=0000ABCD EBX=00000001 ECX=00000002 EDX=00000003\nCS=07C0 SS=0000\n";
        let regs = parse_final_registers(log).expect("expected a parse");
        assert_eq!(regs.eax, 0x0000ABCD);
        assert_eq!(regs.ebx, 1);
        assert_eq!(regs.cs, 0x07C0);
    }

    #[test]
    fn uses_final_block_when_multiple_present() {
        let log = "EAX=00000001 EBX=00000000\n\nEAX=000000FF EBX=00000002\n";
        let regs = parse_final_registers(log).expect("expected a parse");
        assert_eq!(regs.eax, 0xFF);
        assert_eq!(regs.ebx, 2);
    }

    #[test]
    fn returns_none_without_error_when_absent() {
        assert!(parse_final_registers("no registers here\njust boot text\n").is_none());
    }
}
