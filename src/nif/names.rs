//! Host-side names to the names the engine expects.

const BIP_01: &str = "Bip01 ";
const BIP01_L: &str = "Bip01 L ";
const BIP01_R: &str = "Bip01 R ";
const NPC_PREFIX: &str = "NPC ";
const NPC_L: &str = "NPC L ";
const NPC_R: &str = "NPC R ";

/// Placeholder for objects that arrive without a name.
pub const UNNAMED: &str = "unnamed";

fn replace_side(name: &str, prefix: &str, open: &str, close: &str) -> String {
    name.replace(NPC_PREFIX, prefix)
        .replace('[', open)
        .replace(close, "]")
}

/// Side suffixes to side prefixes: `Bip01 Hand.L` is `Bip01 L Hand`,
/// `NPC Hand [Hnd].R` is `NPC R Hand [RHnd]`.
pub fn bone_name_for_nif(name: &str) -> String {
    if let Some(rest) = name.strip_prefix(BIP_01) {
        if let Some(stem) = rest.strip_suffix(".L") {
            return format!("{BIP01_L}{stem}");
        }
        if let Some(stem) = rest.strip_suffix(".R") {
            return format!("{BIP01_R}{stem}");
        }
    } else if name.starts_with(NPC_PREFIX) {
        if name.ends_with("].L") {
            return replace_side(name, NPC_L, "[L", "].L");
        }
        if name.ends_with("].R") {
            return replace_side(name, NPC_R, "[R", "].R");
        }
    }
    name.to_string()
}

/// The name an object is written under: its stored long name if it has one,
/// otherwise the translated host name.
pub fn full_name(name: &str, longname: Option<&str>) -> String {
    match longname {
        Some(longname) if !longname.is_empty() => longname.to_string(),
        _ if name.is_empty() => UNNAMED.to_string(),
        _ => bone_name_for_nif(name),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn biped_side_suffixes_become_prefixes() {
        assert_eq!(bone_name_for_nif("Bip01 Hand.L"), "Bip01 L Hand");
        assert_eq!(bone_name_for_nif("Bip01 Thigh.R"), "Bip01 R Thigh");
        assert_eq!(bone_name_for_nif("Bip01 Spine"), "Bip01 Spine");
    }

    #[test]
    fn npc_brackets_are_rewritten() {
        assert_eq!(bone_name_for_nif("NPC Foo [Foo].L"), "NPC L Foo [LFoo]");
        assert_eq!(bone_name_for_nif("NPC Calf [Clf].R"), "NPC R Calf [RClf]");
        assert_eq!(bone_name_for_nif("NPC Root [Root]"), "NPC Root [Root]");
    }

    #[test]
    fn other_names_pass_through() {
        assert_eq!(bone_name_for_nif("Hand.L"), "Hand.L");
        assert_eq!(bone_name_for_nif("Cube"), "Cube");
    }

    #[test]
    fn long_names_take_precedence() {
        assert_eq!(full_name("Cube.001", Some("Cube")), "Cube");
        assert_eq!(full_name("Bip01 Hand.L", Some("")), "Bip01 L Hand");
        assert_eq!(full_name("", None), UNNAMED);
    }
}
