//! Static entity schema: tables, columns, foreign keys and includable relations.
//! Both store implementations and the DDL bootstrap are driven from these definitions.

use serde::Serialize;
use std::fmt;

/// Entity types managed by the service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    Owner,
    Vet,
    Service,
    Pet,
    Visit,
    VisitService,
    Appointment,
}

impl EntityKind {
    /// All kinds in foreign-key dependency order (parents first).
    pub const ALL: [EntityKind; 7] = [
        EntityKind::Owner,
        EntityKind::Vet,
        EntityKind::Service,
        EntityKind::Pet,
        EntityKind::Visit,
        EntityKind::VisitService,
        EntityKind::Appointment,
    ];

    pub fn def(self) -> &'static EntityDef {
        match self {
            EntityKind::Owner => &OWNERS,
            EntityKind::Vet => &VETS,
            EntityKind::Service => &SERVICES,
            EntityKind::Pet => &PETS,
            EntityKind::Visit => &VISITS,
            EntityKind::VisitService => &VISIT_SERVICES,
            EntityKind::Appointment => &APPOINTMENTS,
        }
    }

    pub fn table_name(self) -> &'static str {
        self.def().table_name
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EntityKind::Owner => "owner",
            EntityKind::Vet => "vet",
            EntityKind::Service => "service",
            EntityKind::Pet => "pet",
            EntityKind::Visit => "visit",
            EntityKind::VisitService => "visit service",
            EntityKind::Appointment => "appointment",
        };
        f.write_str(name)
    }
}

/// Direction of a related-include: to_one (we hold the FK) or to_many (they hold an FK to us).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IncludeDirection {
    ToOne,
    ToMany,
}

/// A relation that can be loaded together with a record.
#[derive(Clone, Debug)]
pub struct IncludeSpec {
    /// Key the related record(s) are attached under.
    pub name: &'static str,
    pub direction: IncludeDirection,
    pub related: EntityKind,
    /// Our column used in the join (our FK for to_one; our PK for to_many).
    pub our_key_column: &'static str,
    /// Their column used in the join (their PK for to_one; their FK for to_many).
    pub their_key_column: &'static str,
}

#[derive(Clone, Debug)]
pub struct ColumnInfo {
    pub name: &'static str,
    /// PostgreSQL type used both in DDL and in parameter casts (e.g. `$1::timestamptz`).
    pub pg_type: &'static str,
    pub nullable: bool,
    /// SQL default expression, if any.
    pub default: Option<&'static str>,
}

#[derive(Clone, Debug)]
pub struct ForeignKey {
    pub column: &'static str,
    pub references: EntityKind,
}

#[derive(Clone, Debug)]
pub struct EntityDef {
    pub kind: EntityKind,
    pub table_name: &'static str,
    pub columns: &'static [ColumnInfo],
    pub foreign_keys: &'static [ForeignKey],
    /// Columns carrying a single-column unique constraint.
    pub unique: &'static [&'static str],
    pub includes: &'static [IncludeSpec],
}

impl EntityDef {
    pub fn column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn include(&self, name: &str) -> Option<&IncludeSpec> {
        self.includes.iter().find(|i| i.name == name)
    }

    /// Columns a caller may write (everything except the primary key and creation timestamp).
    pub fn writable_columns(&self) -> impl Iterator<Item = &ColumnInfo> {
        self.columns
            .iter()
            .filter(|c| c.name != PRIMARY_KEY && c.name != CREATED_AT)
    }
}

pub const PRIMARY_KEY: &str = "id";
pub const CREATED_AT: &str = "created_at";

/// Partial unique index guarding one non-cancelled appointment per vet, day and slot.
pub const APPOINTMENT_SLOT_INDEX: &str = "appointments_slot_unique";

/// Name of the single-column unique constraint for `table.column`.
pub fn unique_constraint_name(table: &str, column: &str) -> String {
    format!("{}_{}_key", table, column)
}

/// Reverse of [`unique_constraint_name`] over all declared unique columns.
pub fn column_for_unique_constraint(constraint: &str) -> Option<&'static str> {
    EntityKind::ALL.iter().find_map(|kind| {
        let def = kind.def();
        def.unique
            .iter()
            .copied()
            .find(|col| unique_constraint_name(def.table_name, col) == constraint)
    })
}

/// Name of the foreign key constraint on `table.column` (PostgreSQL's default naming).
pub fn foreign_key_constraint_name(table: &str, column: &str) -> String {
    format!("{}_{}_fkey", table, column)
}

/// Resolve a foreign key constraint name back to its `(table, column)`.
pub fn foreign_key_for_constraint(constraint: &str) -> Option<(&'static str, &'static str)> {
    EntityKind::ALL.iter().find_map(|kind| {
        let def = kind.def();
        def.foreign_keys
            .iter()
            .find(|fk| foreign_key_constraint_name(def.table_name, fk.column) == constraint)
            .map(|fk| (def.table_name, fk.column))
    })
}

const fn column(name: &'static str, pg_type: &'static str) -> ColumnInfo {
    ColumnInfo {
        name,
        pg_type,
        nullable: false,
        default: None,
    }
}

const fn nullable(name: &'static str, pg_type: &'static str) -> ColumnInfo {
    ColumnInfo {
        name,
        pg_type,
        nullable: true,
        default: None,
    }
}

const fn defaulted(name: &'static str, pg_type: &'static str, default: &'static str) -> ColumnInfo {
    ColumnInfo {
        name,
        pg_type,
        nullable: false,
        default: Some(default),
    }
}

const ID: ColumnInfo = column(PRIMARY_KEY, "int8");
const CREATED: ColumnInfo = defaulted(CREATED_AT, "timestamptz", "NOW()");

const fn to_one(
    name: &'static str,
    related: EntityKind,
    our_key_column: &'static str,
) -> IncludeSpec {
    IncludeSpec {
        name,
        direction: IncludeDirection::ToOne,
        related,
        our_key_column,
        their_key_column: PRIMARY_KEY,
    }
}

const fn to_many(
    name: &'static str,
    related: EntityKind,
    their_key_column: &'static str,
) -> IncludeSpec {
    IncludeSpec {
        name,
        direction: IncludeDirection::ToMany,
        related,
        our_key_column: PRIMARY_KEY,
        their_key_column,
    }
}

static OWNERS: EntityDef = EntityDef {
    kind: EntityKind::Owner,
    table_name: "owners",
    columns: &[
        ID,
        column("first_name", "text"),
        column("last_name", "text"),
        nullable("phone", "text"),
        column("email", "text"),
        nullable("address", "text"),
        CREATED,
    ],
    foreign_keys: &[],
    unique: &["email"],
    includes: &[
        to_many("pets", EntityKind::Pet, "owner_id"),
        to_many("appointments", EntityKind::Appointment, "owner_id"),
    ],
};

static VETS: EntityDef = EntityDef {
    kind: EntityKind::Vet,
    table_name: "vets",
    columns: &[
        ID,
        column("first_name", "text"),
        column("last_name", "text"),
        nullable("specialty", "text"),
        nullable("phone", "text"),
        column("email", "text"),
        CREATED,
    ],
    foreign_keys: &[],
    unique: &["email"],
    includes: &[
        to_many("visits", EntityKind::Visit, "vet_id"),
        to_many("appointments", EntityKind::Appointment, "vet_id"),
    ],
};

static SERVICES: EntityDef = EntityDef {
    kind: EntityKind::Service,
    table_name: "services",
    columns: &[
        ID,
        column("name", "text"),
        nullable("description", "text"),
        defaulted("price", "numeric(10,2)", "0"),
        nullable("category", "text"),
        CREATED,
    ],
    foreign_keys: &[],
    unique: &[],
    includes: &[],
};

static PETS: EntityDef = EntityDef {
    kind: EntityKind::Pet,
    table_name: "pets",
    columns: &[
        ID,
        column("name", "text"),
        column("species", "text"),
        nullable("breed", "text"),
        nullable("birth_date", "date"),
        nullable("gender", "text"),
        column("owner_id", "int8"),
        CREATED,
    ],
    foreign_keys: &[ForeignKey {
        column: "owner_id",
        references: EntityKind::Owner,
    }],
    unique: &[],
    includes: &[
        to_one("owner", EntityKind::Owner, "owner_id"),
        to_many("visits", EntityKind::Visit, "pet_id"),
        to_many("appointments", EntityKind::Appointment, "pet_id"),
    ],
};

static VISITS: EntityDef = EntityDef {
    kind: EntityKind::Visit,
    table_name: "visits",
    columns: &[
        ID,
        column("date", "timestamptz"),
        column("diagnosis", "text"),
        nullable("notes", "text"),
        column("pet_id", "int8"),
        column("vet_id", "int8"),
        CREATED,
    ],
    foreign_keys: &[
        ForeignKey {
            column: "pet_id",
            references: EntityKind::Pet,
        },
        ForeignKey {
            column: "vet_id",
            references: EntityKind::Vet,
        },
    ],
    unique: &[],
    includes: &[
        to_one("pet", EntityKind::Pet, "pet_id"),
        to_one("vet", EntityKind::Vet, "vet_id"),
        to_many("services", EntityKind::VisitService, "visit_id"),
    ],
};

static VISIT_SERVICES: EntityDef = EntityDef {
    kind: EntityKind::VisitService,
    table_name: "visit_services",
    columns: &[
        ID,
        column("visit_id", "int8"),
        column("service_id", "int8"),
        nullable("notes", "text"),
        CREATED,
    ],
    foreign_keys: &[
        ForeignKey {
            column: "visit_id",
            references: EntityKind::Visit,
        },
        ForeignKey {
            column: "service_id",
            references: EntityKind::Service,
        },
    ],
    unique: &[],
    includes: &[
        to_one("service", EntityKind::Service, "service_id"),
        to_one("visit", EntityKind::Visit, "visit_id"),
    ],
};

static APPOINTMENTS: EntityDef = EntityDef {
    kind: EntityKind::Appointment,
    table_name: "appointments",
    columns: &[
        ID,
        column("date", "timestamptz"),
        column("time_slot", "text"),
        defaulted("status", "text", "'scheduled'"),
        nullable("notes", "text"),
        column("pet_id", "int8"),
        column("vet_id", "int8"),
        column("owner_id", "int8"),
        CREATED,
    ],
    foreign_keys: &[
        ForeignKey {
            column: "pet_id",
            references: EntityKind::Pet,
        },
        ForeignKey {
            column: "vet_id",
            references: EntityKind::Vet,
        },
        ForeignKey {
            column: "owner_id",
            references: EntityKind::Owner,
        },
    ],
    unique: &[],
    includes: &[
        to_one("pet", EntityKind::Pet, "pet_id"),
        to_one("vet", EntityKind::Vet, "vet_id"),
        to_one("owner", EntityKind::Owner, "owner_id"),
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn foreign_keys_point_at_earlier_tables() {
        for (pos, kind) in EntityKind::ALL.iter().enumerate() {
            for fk in kind.def().foreign_keys {
                let target = EntityKind::ALL
                    .iter()
                    .position(|k| *k == fk.references)
                    .unwrap();
                assert!(target < pos, "{} references {} declared later", kind, fk.references);
            }
        }
    }

    #[test]
    fn constraint_names_resolve_back() {
        assert_eq!(column_for_unique_constraint("vets_email_key"), Some("email"));
        assert_eq!(column_for_unique_constraint("pets_name_key"), None);
        assert_eq!(
            foreign_key_for_constraint("appointments_owner_id_fkey"),
            Some(("appointments", "owner_id"))
        );
    }

    #[test]
    fn includes_reference_existing_columns() {
        for kind in EntityKind::ALL {
            let def = kind.def();
            for inc in def.includes {
                assert!(def.column(inc.our_key_column).is_some(), "{}.{}", def.table_name, inc.name);
                assert!(inc.related.def().column(inc.their_key_column).is_some());
            }
        }
    }
}
