#[cfg(test)]
mod tests {
    use crate::isa::Opcode;

    /// (variant name, byte value, mnemonic, base cost) for every table entry.
    macro_rules! collect_isa {
        (
            $( $(#[$doc:meta])* $name:ident = $byte:literal, $mnemonic:literal, $cost:expr ),* $(,)?
        ) => {
            vec![ $( (stringify!($name), $byte as u8, $mnemonic, $cost as i64) ),* ]
        };
    }

    fn entries() -> Vec<(&'static str, u8, &'static str, i64)> {
        crate::for_each_opcode!(collect_isa)
    }

    #[test]
    fn byte_values_are_unique() {
        let mut seen = std::collections::HashMap::new();
        for (name, byte, _, _) in entries() {
            if let Some(prev) = seen.insert(byte, name) {
                panic!("byte 0x{byte:02x} assigned to both {prev} and {name}");
            }
        }
    }

    #[test]
    fn mnemonics_are_unique() {
        let mut seen = std::collections::HashMap::new();
        for (name, _, mnemonic, _) in entries() {
            if let Some(prev) = seen.insert(mnemonic, name) {
                panic!("mnemonic {mnemonic} assigned to both {prev} and {name}");
            }
        }
    }

    #[test]
    fn every_opcode_costs_at_least_one() {
        for (name, _, _, cost) in entries() {
            assert!(cost >= 1, "{name} has base cost {cost}");
        }
    }

    #[test]
    fn reserved_bytes_are_not_in_the_table() {
        for (name, byte, _, _) in entries() {
            assert!(byte != 0x65 && byte != 0x66, "{name} uses a reserved byte");
        }
    }

    #[test]
    fn direct_push_range_has_one_representative() {
        // 0x01-0x4b all decode to DataPush; only the representative byte
        // may appear in the table.
        for (name, byte, _, _) in entries() {
            if (0x01..=0x4b).contains(&byte) {
                assert_eq!(name, "DataPush", "{name} shadows the push range");
            }
        }
    }

    #[test]
    fn table_round_trips_through_byte_and_mnemonic() {
        for (_, byte, mnemonic, cost) in entries() {
            let op = Opcode::try_from(byte).unwrap();
            assert_eq!(op.mnemonic(), mnemonic);
            assert_eq!(op.base_cost(), cost);
            assert_eq!(Opcode::from_mnemonic(mnemonic), Some(op));
        }
    }

    #[test]
    fn max_alias_points_at_the_within_byte() {
        // 0xa4 was registered twice; WITHIN won and MAX remains an alias
        // of it.
        assert_eq!(Opcode::from_mnemonic("MAX").map(|op| op as u8), Some(0xa4));
        assert!(entries().iter().all(|&(_, _, m, _)| m != "MAX"));
    }
}
