use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_resources_tables::Migration),
            Box::new(m20240101_000002_create_markings_table::Migration),
            Box::new(m20240101_000003_create_peminjaman_tables::Migration),
            Box::new(m20240101_000004_create_approval_tables::Migration),
            Box::new(m20240101_000005_create_unit_assignments_table::Migration),
        ]
    }
}

// Migration implementations

mod m20240101_000001_create_resources_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_resources_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Prasarana::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Prasarana::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Prasarana::Code)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Prasarana::Name).string().not_null())
                        .col(ColumnDef::new(Prasarana::Location).string())
                        .col(ColumnDef::new(Prasarana::Capacity).integer())
                        .col(
                            ColumnDef::new(Prasarana::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Prasarana::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Prasarana::UpdatedAt).timestamp_with_time_zone())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(Sarana::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Sarana::Id).uuid().primary_key().not_null())
                        .col(
                            ColumnDef::new(Sarana::Code)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(Sarana::Name).string().not_null())
                        .col(ColumnDef::new(Sarana::Tracking).string().not_null())
                        .col(
                            ColumnDef::new(Sarana::TotalUnits)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Sarana::AvailableUnits)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Sarana::DamagedUnits)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Sarana::MaintenanceUnits)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Sarana::LostUnits)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Sarana::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(Sarana::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Sarana::UpdatedAt).timestamp_with_time_zone())
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(SaranaUnits::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(SaranaUnits::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SaranaUnits::SaranaId).uuid().not_null())
                        .col(
                            ColumnDef::new(SaranaUnits::UnitCode)
                                .string()
                                .not_null()
                                .unique_key(),
                        )
                        .col(ColumnDef::new(SaranaUnits::Status).string().not_null())
                        .col(
                            ColumnDef::new(SaranaUnits::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(SaranaUnits::UpdatedAt).timestamp_with_time_zone())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_sarana_units_sarana_status")
                        .table(SaranaUnits::Table)
                        .col(SaranaUnits::SaranaId)
                        .col(SaranaUnits::Status)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(SaranaUnits::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Sarana::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Prasarana::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Prasarana {
        Table,
        Id,
        Code,
        Name,
        Location,
        Capacity,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum Sarana {
        Table,
        Id,
        Code,
        Name,
        Tracking,
        TotalUnits,
        AvailableUnits,
        DamagedUnits,
        MaintenanceUnits,
        LostUnits,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum SaranaUnits {
        Table,
        Id,
        SaranaId,
        UnitCode,
        Status,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000002_create_markings_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_markings_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Markings::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(Markings::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(Markings::OwnerId).uuid().not_null())
                        .col(ColumnDef::new(Markings::PrasaranaId).uuid())
                        .col(ColumnDef::new(Markings::LocationText).string())
                        .col(
                            ColumnDef::new(Markings::StartAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Markings::EndAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Markings::Participants)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(
                            ColumnDef::new(Markings::ExpiresAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Markings::PlannedSubmitBy).timestamp_with_time_zone())
                        .col(ColumnDef::new(Markings::Status).string().not_null())
                        .col(ColumnDef::new(Markings::Notes).string())
                        .col(
                            ColumnDef::new(Markings::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Markings::UpdatedAt).timestamp_with_time_zone())
                        .to_owned(),
                )
                .await?;

            // Hot path of the expiry sweep and the conflict detector.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_markings_status_expires")
                        .table(Markings::Table)
                        .col(Markings::Status)
                        .col(Markings::ExpiresAt)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_markings_owner")
                        .table(Markings::Table)
                        .col(Markings::OwnerId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Markings::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Markings {
        Table,
        Id,
        OwnerId,
        PrasaranaId,
        LocationText,
        StartAt,
        EndAt,
        Participants,
        ExpiresAt,
        PlannedSubmitBy,
        Status,
        Notes,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000003_create_peminjaman_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_peminjaman_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Peminjaman::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Peminjaman::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Peminjaman::OwnerId).uuid().not_null())
                        .col(ColumnDef::new(Peminjaman::PrasaranaId).uuid())
                        .col(ColumnDef::new(Peminjaman::LocationText).string())
                        .col(
                            ColumnDef::new(Peminjaman::StartAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Peminjaman::EndAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Peminjaman::Participants)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(Peminjaman::Status).string().not_null())
                        .col(ColumnDef::new(Peminjaman::ConflictGroup).string())
                        .col(ColumnDef::new(Peminjaman::DocumentRef).string())
                        .col(ColumnDef::new(Peminjaman::RejectionReason).string())
                        .col(ColumnDef::new(Peminjaman::CancelReason).string())
                        .col(ColumnDef::new(Peminjaman::CancelledBy).uuid())
                        .col(ColumnDef::new(Peminjaman::CancelledAt).timestamp_with_time_zone())
                        .col(ColumnDef::new(Peminjaman::PickupPhotoRef).string())
                        .col(ColumnDef::new(Peminjaman::PickedUpBy).uuid())
                        .col(ColumnDef::new(Peminjaman::PickedUpAt).timestamp_with_time_zone())
                        .col(ColumnDef::new(Peminjaman::ReturnPhotoRef).string())
                        .col(ColumnDef::new(Peminjaman::ReturnedBy).uuid())
                        .col(ColumnDef::new(Peminjaman::ReturnedAt).timestamp_with_time_zone())
                        .col(ColumnDef::new(Peminjaman::MarkingId).uuid())
                        .col(
                            ColumnDef::new(Peminjaman::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Peminjaman::UpdatedAt).timestamp_with_time_zone())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_peminjaman_status")
                        .table(Peminjaman::Table)
                        .col(Peminjaman::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_peminjaman_owner_status")
                        .table(Peminjaman::Table)
                        .col(Peminjaman::OwnerId)
                        .col(Peminjaman::Status)
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(PeminjamanItems::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(PeminjamanItems::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PeminjamanItems::PeminjamanId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PeminjamanItems::SaranaId).uuid().not_null())
                        .col(
                            ColumnDef::new(PeminjamanItems::Quantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(PeminjamanItems::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(PeminjamanItems::UpdatedAt).timestamp_with_time_zone())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_peminjaman_items_sarana")
                        .table(PeminjamanItems::Table)
                        .col(PeminjamanItems::SaranaId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(PeminjamanItems::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(Peminjaman::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum Peminjaman {
        Table,
        Id,
        OwnerId,
        PrasaranaId,
        LocationText,
        StartAt,
        EndAt,
        Participants,
        Status,
        ConflictGroup,
        DocumentRef,
        RejectionReason,
        CancelReason,
        CancelledBy,
        CancelledAt,
        PickupPhotoRef,
        PickedUpBy,
        PickedUpAt,
        ReturnPhotoRef,
        ReturnedBy,
        ReturnedAt,
        MarkingId,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum PeminjamanItems {
        Table,
        Id,
        PeminjamanId,
        SaranaId,
        Quantity,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000004_create_approval_tables {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_approval_tables"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(GlobalApprovers::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(GlobalApprovers::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(GlobalApprovers::UserId).uuid().not_null())
                        .col(ColumnDef::new(GlobalApprovers::Level).integer().not_null())
                        .col(
                            ColumnDef::new(GlobalApprovers::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(GlobalApprovers::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(GlobalApprovers::UpdatedAt).timestamp_with_time_zone(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_global_approvers_user_level")
                        .table(GlobalApprovers::Table)
                        .col(GlobalApprovers::UserId)
                        .col(GlobalApprovers::Level)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ResourceApprovers::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ResourceApprovers::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ResourceApprovers::ResourceType)
                                .string()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ResourceApprovers::ResourceId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ResourceApprovers::UserId).uuid().not_null())
                        .col(
                            ColumnDef::new(ResourceApprovers::Level)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ResourceApprovers::IsActive)
                                .boolean()
                                .not_null()
                                .default(true),
                        )
                        .col(
                            ColumnDef::new(ResourceApprovers::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ResourceApprovers::UpdatedAt)
                                .timestamp_with_time_zone(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_resource_approvers_asgmt")
                        .table(ResourceApprovers::Table)
                        .col(ResourceApprovers::ResourceType)
                        .col(ResourceApprovers::ResourceId)
                        .col(ResourceApprovers::UserId)
                        .col(ResourceApprovers::Level)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_table(
                    Table::create()
                        .table(ApprovalSteps::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ApprovalSteps::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ApprovalSteps::PeminjamanId)
                                .uuid()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ApprovalSteps::ApprovalType)
                                .string()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ApprovalSteps::Level).integer().not_null())
                        .col(ColumnDef::new(ApprovalSteps::ResourceType).string())
                        .col(ColumnDef::new(ApprovalSteps::ResourceId).uuid())
                        .col(ColumnDef::new(ApprovalSteps::ApproverId).uuid().not_null())
                        .col(ColumnDef::new(ApprovalSteps::Decision).string().not_null())
                        .col(ColumnDef::new(ApprovalSteps::Reason).string())
                        .col(ColumnDef::new(ApprovalSteps::OverriddenBy).uuid())
                        .col(
                            ColumnDef::new(ApprovalSteps::OutOfOrder)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(ApprovalSteps::DecidedAt).timestamp_with_time_zone())
                        .col(
                            ColumnDef::new(ApprovalSteps::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(ApprovalSteps::UpdatedAt).timestamp_with_time_zone())
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("uq_approval_steps_gate")
                        .table(ApprovalSteps::Table)
                        .col(ApprovalSteps::PeminjamanId)
                        .col(ApprovalSteps::ApprovalType)
                        .col(ApprovalSteps::ResourceType)
                        .col(ApprovalSteps::ResourceId)
                        .col(ApprovalSteps::Level)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_approval_steps_peminjaman_decision")
                        .table(ApprovalSteps::Table)
                        .col(ApprovalSteps::PeminjamanId)
                        .col(ApprovalSteps::Decision)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ApprovalSteps::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(ResourceApprovers::Table).to_owned())
                .await?;
            manager
                .drop_table(Table::drop().table(GlobalApprovers::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum GlobalApprovers {
        Table,
        Id,
        UserId,
        Level,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum ResourceApprovers {
        Table,
        Id,
        ResourceType,
        ResourceId,
        UserId,
        Level,
        IsActive,
        CreatedAt,
        UpdatedAt,
    }

    #[derive(DeriveIden)]
    pub(super) enum ApprovalSteps {
        Table,
        Id,
        PeminjamanId,
        ApprovalType,
        Level,
        ResourceType,
        ResourceId,
        ApproverId,
        Decision,
        Reason,
        OverriddenBy,
        OutOfOrder,
        DecidedAt,
        CreatedAt,
        UpdatedAt,
    }
}

mod m20240101_000005_create_unit_assignments_table {
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_unit_assignments_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(UnitAssignments::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(UnitAssignments::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(UnitAssignments::PeminjamanId)
                                .uuid()
                                .not_null(),
                        )
                        .col(ColumnDef::new(UnitAssignments::ItemId).uuid().not_null())
                        .col(ColumnDef::new(UnitAssignments::SaranaId).uuid().not_null())
                        .col(ColumnDef::new(UnitAssignments::UnitId).uuid())
                        .col(
                            ColumnDef::new(UnitAssignments::Quantity)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(UnitAssignments::Released)
                                .boolean()
                                .not_null()
                                .default(false),
                        )
                        .col(ColumnDef::new(UnitAssignments::ConditionOnReturn).string())
                        .col(
                            ColumnDef::new(UnitAssignments::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(UnitAssignments::UpdatedAt).timestamp_with_time_zone())
                        .to_owned(),
                )
                .await?;

            // Double-assignment guard scans open rows by unit.
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_unit_assignments_unit_released")
                        .table(UnitAssignments::Table)
                        .col(UnitAssignments::UnitId)
                        .col(UnitAssignments::Released)
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_unit_assignments_peminjaman")
                        .table(UnitAssignments::Table)
                        .col(UnitAssignments::PeminjamanId)
                        .to_owned(),
                )
                .await?;

            Ok(())
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(UnitAssignments::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum UnitAssignments {
        Table,
        Id,
        PeminjamanId,
        ItemId,
        SaranaId,
        UnitId,
        Quantity,
        Released,
        ConditionOnReturn,
        CreatedAt,
        UpdatedAt,
    }
}
