//! Console rendering of the switching table and the forwarded frame counters.

use std::fmt::Write;

use crate::control::{CounterSnapshot, MacAddress, PortId};

const TABLE_RULE: &str = "+------+-------------------+";

/// Render `(mac, port)` rows as a boxed table.
///
/// # Example
/// ```
/// use tapswitch::control::{MacAddress, PortId};
/// use tapswitch::report::format_table;
///
/// let mac = MacAddress::new([0x00, 0x1a, 0x2b, 0x3c, 0x4d, 0x5e]);
/// let table = format_table(&[(mac, PortId::PortA)]);
///
/// assert!(table.contains("| A    | 00:1A:2B:3C:4D:5E |"));
/// ```
pub fn format_table(entries: &[(MacAddress, PortId)]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{}", TABLE_RULE);
    let _ = writeln!(out, "| Port | MAC               |");
    let _ = writeln!(out, "{}", TABLE_RULE);
    for (mac, port) in entries {
        let _ = writeln!(out, "| {:<4} | {} |", port.label(), mac);
        let _ = writeln!(out, "{}", TABLE_RULE);
    }
    out
}

/// Render forwarded frame counts, one line per egress port.
pub fn format_counters(counters: &CounterSnapshot) -> String {
    format!(
        "Port A: {}\nPort B: {}\n",
        counters.get(PortId::PortA),
        counters.get(PortId::PortB)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_table_has_only_header() {
        let table = format_table(&[]);
        assert_eq!(table.lines().count(), 3);
    }

    #[test]
    fn test_rows_in_given_order() {
        let a = MacAddress::new([0x02, 0, 0, 0, 0, 0x0a]);
        let b = MacAddress::new([0x02, 0, 0, 0, 0, 0x0b]);
        let table = format_table(&[(a, PortId::PortA), (b, PortId::PortB)]);
        let rows: Vec<&str> = table.lines().filter(|l| l.starts_with("| ") && !l.contains("Port")).collect();
        assert_eq!(rows, vec!["| A    | 02:00:00:00:00:0A |", "| B    | 02:00:00:00:00:0B |"]);
    }

    #[test]
    fn test_counters() {
        let counters = CounterSnapshot { port_a: 7, port_b: 3 };
        assert_eq!(format_counters(&counters), "Port A: 7\nPort B: 3\n");
    }
}
