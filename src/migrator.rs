use sea_orm_migration::prelude::*;

pub struct Migrator;

#[async_trait::async_trait]
impl MigratorTrait for Migrator {
    fn migrations() -> Vec<Box<dyn MigrationTrait>> {
        vec![
            Box::new(m20240101_000001_create_turbine_data_table::Migration),
            Box::new(m20240101_000002_create_turbine_watermarks_table::Migration),
            Box::new(m20240101_000003_create_job_logs_table::Migration),
            Box::new(m20240101_000004_create_computed_windows_table::Migration),
            Box::new(m20240101_000005_create_anomalies_table::Migration),
        ]
    }
}

mod m20240101_000001_create_turbine_data_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000001_create_turbine_data_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(TurbineData::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(TurbineData::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(TurbineData::TurbineId).integer().not_null())
                        .col(ColumnDef::new(TurbineData::WindSpeed).double().not_null())
                        .col(
                            ColumnDef::new(TurbineData::WindDirection)
                                .integer()
                                .not_null(),
                        )
                        .col(ColumnDef::new(TurbineData::PowerOutput).double().not_null())
                        .col(
                            ColumnDef::new(TurbineData::Timestamp)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TurbineData::IngestedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // One reading per turbine and instant
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_turbine_data_turbine_timestamp")
                        .table(TurbineData::Table)
                        .col(TurbineData::TurbineId)
                        .col(TurbineData::Timestamp)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(TurbineData::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum TurbineData {
        Table,
        Id,
        TurbineId,
        WindSpeed,
        WindDirection,
        PowerOutput,
        Timestamp,
        IngestedAt,
    }
}

mod m20240101_000002_create_turbine_watermarks_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000002_create_turbine_watermarks_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(TurbineWatermarks::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(TurbineWatermarks::TurbineId)
                                .integer()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(TurbineWatermarks::LastIngestedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(TurbineWatermarks::LastComputedAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(TurbineWatermarks::LastSweptAt)
                                .timestamp_with_time_zone()
                                .null(),
                        )
                        .col(
                            ColumnDef::new(TurbineWatermarks::UpdatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(TurbineWatermarks::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum TurbineWatermarks {
        Table,
        TurbineId,
        LastIngestedAt,
        LastComputedAt,
        LastSweptAt,
        UpdatedAt,
    }
}

mod m20240101_000003_create_job_logs_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000003_create_job_logs_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(JobLogs::Table)
                        .if_not_exists()
                        .col(ColumnDef::new(JobLogs::Id).uuid().primary_key().not_null())
                        .col(ColumnDef::new(JobLogs::TurbineId).integer().not_null())
                        .col(ColumnDef::new(JobLogs::SourceFile).string().not_null())
                        .col(ColumnDef::new(JobLogs::RowsInserted).integer().not_null())
                        .col(
                            ColumnDef::new(JobLogs::LastEntry)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(JobLogs::JobTimestamp)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_job_logs_turbine_id")
                        .table(JobLogs::Table)
                        .col(JobLogs::TurbineId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(JobLogs::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum JobLogs {
        Table,
        Id,
        TurbineId,
        SourceFile,
        RowsInserted,
        LastEntry,
        JobTimestamp,
    }
}

mod m20240101_000004_create_computed_windows_table {

    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000004_create_computed_windows_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(ComputedWindows::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(ComputedWindows::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ComputedWindows::TurbineId)
                                .integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ComputedWindows::ComputeTimeWindow)
                                .big_integer()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ComputedWindows::WindowStart)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ComputedWindows::WindowEnd)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(ComputedWindows::SampleCount)
                                .integer()
                                .not_null()
                                .default(0),
                        )
                        .col(ColumnDef::new(ComputedWindows::MinPower).double().null())
                        .col(ColumnDef::new(ComputedWindows::MaxPower).double().null())
                        .col(ColumnDef::new(ComputedWindows::MeanPower).double().null())
                        .col(
                            ColumnDef::new(ComputedWindows::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .to_owned(),
                )
                .await?;

            // A window for a turbine covering a given range exists at most once
            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_computed_windows_turbine_range")
                        .table(ComputedWindows::Table)
                        .col(ComputedWindows::TurbineId)
                        .col(ComputedWindows::WindowStart)
                        .col(ComputedWindows::WindowEnd)
                        .unique()
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(ComputedWindows::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    pub(super) enum ComputedWindows {
        Table,
        Id,
        TurbineId,
        ComputeTimeWindow,
        WindowStart,
        WindowEnd,
        SampleCount,
        MinPower,
        MaxPower,
        MeanPower,
        CreatedAt,
    }
}

mod m20240101_000005_create_anomalies_table {

    use super::m20240101_000004_create_computed_windows_table::ComputedWindows;
    use sea_orm_migration::prelude::*;

    pub struct Migration;

    impl MigrationName for Migration {
        fn name(&self) -> &str {
            "m20240101_000005_create_anomalies_table"
        }
    }

    #[async_trait::async_trait]
    impl MigrationTrait for Migration {
        async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .create_table(
                    Table::create()
                        .table(Anomalies::Table)
                        .if_not_exists()
                        .col(
                            ColumnDef::new(Anomalies::Id)
                                .uuid()
                                .primary_key()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Anomalies::WindowId).uuid().not_null())
                        .col(ColumnDef::new(Anomalies::TurbineId).integer().not_null())
                        .col(
                            ColumnDef::new(Anomalies::Timestamp)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .col(ColumnDef::new(Anomalies::PowerOutput).double().not_null())
                        .col(
                            ColumnDef::new(Anomalies::OutputDeviation)
                                .double()
                                .not_null(),
                        )
                        .col(
                            ColumnDef::new(Anomalies::CreatedAt)
                                .timestamp_with_time_zone()
                                .not_null(),
                        )
                        .foreign_key(
                            ForeignKey::create()
                                .name("fk_anomalies_window_id")
                                .from(Anomalies::Table, Anomalies::WindowId)
                                .to(ComputedWindows::Table, ComputedWindows::Id)
                                .on_delete(ForeignKeyAction::Cascade)
                                .on_update(ForeignKeyAction::Cascade),
                        )
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_anomalies_window_timestamp")
                        .table(Anomalies::Table)
                        .col(Anomalies::WindowId)
                        .col(Anomalies::Timestamp)
                        .unique()
                        .to_owned(),
                )
                .await?;

            manager
                .create_index(
                    Index::create()
                        .if_not_exists()
                        .name("idx_anomalies_turbine_id")
                        .table(Anomalies::Table)
                        .col(Anomalies::TurbineId)
                        .to_owned(),
                )
                .await
        }

        async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
            manager
                .drop_table(Table::drop().table(Anomalies::Table).to_owned())
                .await
        }
    }

    #[derive(DeriveIden)]
    enum Anomalies {
        Table,
        Id,
        WindowId,
        TurbineId,
        Timestamp,
        PowerOutput,
        OutputDeviation,
        CreatedAt,
    }
}
