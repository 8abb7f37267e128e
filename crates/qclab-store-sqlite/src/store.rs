//! [`SqliteStore`], the SQLite implementation of [`QualityStore`].

use std::path::Path;

use chrono::Utc;
use qclab_core::{
  catalog::RuleSnapshot,
  limits::{ControlContext, ControlLimits},
  measurement::{MeasurementPoint, NewMeasurement},
  rule::RuleConfig,
  store::{NewViolation, QualityStore},
  violation::{Disposition, RecordOutcome, Violation, ViolationFilter},
};
use rusqlite::OptionalExtension as _;
use uuid::Uuid;

use crate::{
  encode::{
    MEASUREMENT_COLUMNS, RULE_COLUMNS, RawMeasurement, RawRule, RawViolation,
    VIOLATION_COLUMNS, encode_date, encode_dt, encode_levels, encode_uuid,
  },
  schema::SCHEMA,
  Result,
};

// ─── Store ───────────────────────────────────────────────────────────────────

/// A qclab store backed by a single SQLite file.
///
/// Cloning shares the inner reference-counted connection. All calls
/// are serialised onto one connection thread, so concurrent
/// `record_if_absent` calls with the same key resolve to one insert.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open a fresh in-memory store.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  /// Distinct contexts that have at least one measurement.
  pub async fn list_contexts(&self) -> Result<Vec<ControlContext>> {
    let contexts = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT DISTINCT analyte_id, lot_id, instrument_id, level_id
           FROM measurements
           ORDER BY analyte_id, lot_id, instrument_id, level_id",
        )?;
        let rows = stmt
          .query_map([], |row| {
            Ok(ControlContext {
              analyte_id:    row.get(0)?,
              lot_id:        row.get(1)?,
              instrument_id: row.get(2)?,
              level_id:      row.get(3)?,
            })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(contexts)
  }

  async fn get_violation(&self, violation_id: String) -> Result<Option<Violation>> {
    let raw: Option<RawViolation> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {VIOLATION_COLUMNS} FROM violations WHERE violation_id = ?1"),
            rusqlite::params![violation_id],
            RawViolation::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawViolation::into_violation).transpose()
  }
}

// ─── QualityStore impl ───────────────────────────────────────────────────────

impl QualityStore for SqliteStore {
  type Error = crate::Error;

  // ── Control limits ────────────────────────────────────────────────────────

  async fn get_limits(&self, context: &ControlContext) -> Result<Option<ControlLimits>> {
    let ctx = context.clone();

    let limits = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            "SELECT mean, standard_deviation FROM control_limits
             WHERE analyte_id = ?1 AND lot_id = ?2
               AND instrument_id = ?3 AND level_id = ?4",
            rusqlite::params![
              ctx.analyte_id,
              ctx.lot_id,
              ctx.instrument_id,
              ctx.level_id
            ],
            |row| Ok(ControlLimits::new(row.get(0)?, row.get(1)?)),
          )
          .optional()?)
      })
      .await?;

    Ok(limits)
  }

  async fn put_limits(&self, context: &ControlContext, limits: ControlLimits) -> Result<()> {
    let ctx    = context.clone();
    let at_str = encode_dt(Utc::now());

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO control_limits (
             analyte_id, lot_id, instrument_id, level_id,
             mean, standard_deviation, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
           ON CONFLICT (analyte_id, lot_id, instrument_id, level_id) DO UPDATE SET
             mean               = excluded.mean,
             standard_deviation = excluded.standard_deviation,
             updated_at         = excluded.updated_at",
          rusqlite::params![
            ctx.analyte_id,
            ctx.lot_id,
            ctx.instrument_id,
            ctx.level_id,
            limits.mean,
            limits.standard_deviation,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  // ── Rule catalog ──────────────────────────────────────────────────────────

  async fn rule_snapshot(&self) -> Result<RuleSnapshot> {
    let (version, raws): (i64, Vec<RawRule>) = self
      .conn
      .call(|conn| {
        // One read transaction so the version matches the rows.
        let tx = conn.transaction()?;
        let version: i64 =
          tx.query_row("SELECT version FROM catalog_meta WHERE id = 1", [], |r| r.get(0))?;
        let rows = {
          let mut stmt = tx.prepare(&format!(
            "SELECT {RULE_COLUMNS} FROM control_rules ORDER BY rule_id"
          ))?;
          stmt
            .query_map([], RawRule::from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?
        };
        tx.commit()?;
        Ok((version, rows))
      })
      .await?;

    let mut configs = Vec::with_capacity(raws.len());
    for raw in raws {
      match raw.into_config() {
        Ok(config) => configs.push(config),
        Err(e) => tracing::warn!(error = %e, "skipping undecodable control rule row"),
      }
    }
    Ok(RuleSnapshot::from_configs(version.max(0) as u64, configs))
  }

  async fn list_rule_configs(&self) -> Result<Vec<RuleConfig>> {
    let raws: Vec<RawRule> = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {RULE_COLUMNS} FROM control_rules ORDER BY rule_id"
        ))?;
        let rows = stmt
          .query_map([], RawRule::from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawRule::into_config).collect()
  }

  async fn upsert_rule(&self, config: RuleConfig) -> Result<u64> {
    let levels_str = encode_levels(&config.applies_to_levels)?;
    let at_str     = encode_dt(Utc::now());

    let version: i64 = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        tx.execute(
          "INSERT INTO control_rules (
             code, severity, window_size, threshold_sd, consecutive_points,
             same_side, opposite_sides, sum_abs_z_greater_than, active,
             applies_to_levels, updated_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
           ON CONFLICT (code) DO UPDATE SET
             severity               = excluded.severity,
             window_size            = excluded.window_size,
             threshold_sd           = excluded.threshold_sd,
             consecutive_points     = excluded.consecutive_points,
             same_side              = excluded.same_side,
             opposite_sides         = excluded.opposite_sides,
             sum_abs_z_greater_than = excluded.sum_abs_z_greater_than,
             active                 = excluded.active,
             applies_to_levels      = excluded.applies_to_levels,
             updated_at             = excluded.updated_at",
          rusqlite::params![
            config.code,
            config.severity.as_ref(),
            config.window_size as i64,
            config.threshold_sd,
            config.consecutive_points.map(|n| n as i64),
            config.same_side,
            config.opposite_sides,
            config.sum_abs_z_greater_than,
            config.active,
            levels_str,
            at_str,
          ],
        )?;
        tx.execute("UPDATE catalog_meta SET version = version + 1 WHERE id = 1", [])?;
        let version: i64 =
          tx.query_row("SELECT version FROM catalog_meta WHERE id = 1", [], |r| r.get(0))?;
        tx.commit()?;
        Ok(version)
      })
      .await?;

    Ok(version.max(0) as u64)
  }

  // ── Measurements ──────────────────────────────────────────────────────────

  async fn append_measurement(&self, input: NewMeasurement) -> Result<MeasurementPoint> {
    let point = MeasurementPoint {
      measurement_id: Uuid::new_v4(),
      context:        input.context,
      value:          input.value,
      measured_on:    input.measured_on,
      recorded_at:    Utc::now(),
    };

    let id_str   = encode_uuid(point.measurement_id);
    let ctx      = point.context.clone();
    let value    = point.value;
    let date_str = encode_date(point.measured_on);
    let at_str   = encode_dt(point.recorded_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO measurements (
             measurement_id, analyte_id, lot_id, instrument_id, level_id,
             value, measured_on, recorded_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
          rusqlite::params![
            id_str,
            ctx.analyte_id,
            ctx.lot_id,
            ctx.instrument_id,
            ctx.level_id,
            value,
            date_str,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(point)
  }

  async fn get_run(&self, context: &ControlContext) -> Result<Vec<MeasurementPoint>> {
    let ctx = context.clone();

    let raws: Vec<RawMeasurement> = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {MEASUREMENT_COLUMNS} FROM measurements
           WHERE analyte_id = ?1 AND lot_id = ?2
             AND instrument_id = ?3 AND level_id = ?4
           ORDER BY measured_on, recorded_at, seq"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![
              ctx.analyte_id,
              ctx.lot_id,
              ctx.instrument_id,
              ctx.level_id
            ],
            RawMeasurement::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawMeasurement::into_point).collect()
  }

  async fn get_measurement(&self, id: Uuid) -> Result<Option<MeasurementPoint>> {
    let id_str = encode_uuid(id);

    let raw: Option<RawMeasurement> = self
      .conn
      .call(move |conn| {
        Ok(conn
          .query_row(
            &format!("SELECT {MEASUREMENT_COLUMNS} FROM measurements WHERE measurement_id = ?1"),
            rusqlite::params![id_str],
            RawMeasurement::from_row,
          )
          .optional()?)
      })
      .await?;

    raw.map(RawMeasurement::into_point).transpose()
  }

  // ── Violation recorder ────────────────────────────────────────────────────

  async fn record_if_absent(&self, input: NewViolation) -> Result<RecordOutcome> {
    let id_str   = input.key.digest();
    let ctx      = input.key.context.clone();
    let date_str = encode_date(input.key.measured_on);
    let code     = input.key.rule_code.clone();
    let severity = input.severity.as_ref().to_owned();
    let content  = input.content;
    let z_score  = input.z_score;
    let at_str   = encode_dt(Utc::now());

    let (inserted, raw): (usize, RawViolation) = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction()?;
        // First writer wins; a duplicate key is a no-op, not an error.
        let inserted = tx.execute(
          "INSERT INTO violations (
             violation_id, lot_id, instrument_id, level_id, analyte_id,
             measured_on, rule_code, severity, content, z_score, recorded_at
           ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
           ON CONFLICT DO NOTHING",
          rusqlite::params![
            id_str,
            ctx.lot_id,
            ctx.instrument_id,
            ctx.level_id,
            ctx.analyte_id,
            date_str,
            code,
            severity,
            content,
            z_score,
            at_str,
          ],
        )?;
        let raw = tx.query_row(
          &format!(
            "SELECT {VIOLATION_COLUMNS} FROM violations
             WHERE lot_id = ?1 AND instrument_id = ?2 AND level_id = ?3
               AND analyte_id = ?4 AND measured_on = ?5 AND rule_code = ?6"
          ),
          rusqlite::params![
            ctx.lot_id,
            ctx.instrument_id,
            ctx.level_id,
            ctx.analyte_id,
            date_str,
            code
          ],
          RawViolation::from_row,
        )?;
        tx.commit()?;
        Ok((inserted, raw))
      })
      .await?;

    Ok(RecordOutcome { created: inserted == 1, violation: raw.into_violation()? })
  }

  async fn list_violations(&self, filter: &ViolationFilter) -> Result<Vec<Violation>> {
    let analyte    = filter.analyte_id.clone();
    let lot        = filter.lot_id.clone();
    let instrument = filter.instrument_id.clone();
    let level      = filter.level_id.clone();
    let status     = filter.status.map(|s| s.as_ref().to_owned());
    let limit_val  = filter.limit.unwrap_or(100) as i64;

    let raws: Vec<RawViolation> = self
      .conn
      .call(move |conn| {
        // NULL parameters disable their condition.
        let mut stmt = conn.prepare(&format!(
          "SELECT {VIOLATION_COLUMNS} FROM violations
           WHERE (?1 IS NULL OR analyte_id    = ?1)
             AND (?2 IS NULL OR lot_id        = ?2)
             AND (?3 IS NULL OR instrument_id = ?3)
             AND (?4 IS NULL OR level_id      = ?4)
             AND (?5 IS NULL OR status        = ?5)
           ORDER BY measured_on DESC, recorded_at DESC
           LIMIT ?6"
        ))?;
        let rows = stmt
          .query_map(
            rusqlite::params![analyte, lot, instrument, level, status, limit_val],
            RawViolation::from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;

    raws.into_iter().map(RawViolation::into_violation).collect()
  }

  async fn set_disposition(
    &self,
    violation_id: String,
    disposition:  Disposition,
  ) -> Result<Option<Violation>> {
    let id_str     = violation_id.clone();
    let status_str = disposition.status.as_ref().to_owned();

    let updated = self
      .conn
      .call(move |conn| {
        Ok(conn.execute(
          "UPDATE violations SET action = ?2, assigned_staff = ?3, status = ?4
           WHERE violation_id = ?1",
          rusqlite::params![
            id_str,
            disposition.action,
            disposition.assigned_staff,
            status_str
          ],
        )?)
      })
      .await?;

    if updated == 0 {
      return Ok(None);
    }
    self.get_violation(violation_id).await
  }
}
