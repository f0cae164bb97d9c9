//! Kind Registry - static table of the resource kinds the engine knows
//!
//! Used by the CLI to resolve a kind name to its cache directory and display
//! name, and to list what can be enumerated.

use super::object::CloudResource;
use super::schema::Schema;
use super::types::{DbSubnetGroup, ReceiptRuleSet, SecurityGroup, Table};

/// Kind definition
#[derive(Debug, Clone, Copy)]
pub struct KindDef {
    pub kind: &'static str,
    pub client: &'static str,
    pub display_name: &'static str,
    /// Alternative names accepted on the command line
    pub aliases: &'static [&'static str],
    pub schema: &'static Schema,
}

impl KindDef {
    fn of<R: CloudResource>(display_name: &'static str, aliases: &'static [&'static str]) -> Self {
        Self {
            kind: R::KIND,
            client: R::CLIENT,
            display_name,
            aliases,
            schema: R::schema(),
        }
    }

    fn matches(&self, name: &str) -> bool {
        self.kind.eq_ignore_ascii_case(name) || self.aliases.iter().any(|a| a.eq_ignore_ascii_case(name))
    }
}

/// All registered kinds, in display order
pub fn get_registry() -> [KindDef; 4] {
    [
        KindDef::of::<SecurityGroup>("Security Groups", &["sg", "security-group", "ec2-security-groups"]),
        KindDef::of::<ReceiptRuleSet>("Receipt Rule Sets", &["receipt-rule-set", "ses-receipt-rule-sets"]),
        KindDef::of::<DbSubnetGroup>("DB Subnet Groups", &["db-subnet-group", "rds-subnet-groups"]),
        KindDef::of::<Table>("Tables", &["dynamodb-tables", "dynamodb"]),
    ]
}

/// Get a kind definition by name or alias
pub fn get_kind(name: &str) -> Option<KindDef> {
    get_registry().into_iter().find(|def| def.matches(name))
}

/// Get all kind names (for help output)
pub fn get_all_kinds() -> Vec<&'static str> {
    get_registry().iter().map(|def| def.kind).collect()
}
