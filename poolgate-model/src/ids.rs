use uuid::Uuid;

macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        #[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
        #[cfg_attr(feature = "serde", serde(transparent))]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                $name(Uuid::now_v7())
            }

            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }

            pub fn to_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl AsRef<Uuid> for $name {
            fn as_ref(&self) -> &Uuid {
                &self.0
            }
        }

        impl From<Uuid> for $name {
            fn from(id: Uuid) -> Self {
                $name(id)
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id! {
    /// Strongly typed ID for pool records
    RecordId
}

uuid_id! {
    /// Strongly typed ID for tenants (customer accounts)
    TenantId
}

uuid_id! {
    /// Strongly typed ID for tenant campaigns
    CampaignId
}

uuid_id! {
    /// Strongly typed ID for assignments (record-to-tenant ownership edges)
    AssignmentId
}

uuid_id! {
    /// Strongly typed ID for shared physical resources (domain, number, seat)
    ResourceId
}

uuid_id! {
    /// Strongly typed ID for suppression entries
    SuppressionId
}
