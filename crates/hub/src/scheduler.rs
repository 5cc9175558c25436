//! Schedule evaluator: polls the wall clock and fires stored alarms by
//! publishing trigger commands through MQTT.
//!
//! The evaluator is a pure decision engine — it publishes a weather tag
//! and a `trigger_alarm` command on the bus; the node decides if and
//! when the ring actually starts (it still needs someone in the bed).
//!
//! The poll interval (10 s) samples each calendar minute up to six
//! times, so every fire is deduped per alarm on the full fired minute:
//! at most one trigger per alarm per calendar minute, and a daily alarm
//! still fires again the next day.

use std::collections::HashMap;
use std::time::Duration;

use rumqttc::{AsyncClient, QoS};
use time::OffsetDateTime;
use tracing::{info, warn};

use crate::state::SharedState;
use crate::store::SharedStore;
use crate::weather::WeatherService;
use wakemat_proto::{Alarm, Command};

// ---------------------------------------------------------------------------
// Dedupe state
// ---------------------------------------------------------------------------

/// Last fired minute per alarm id.
pub(crate) struct FiredMinutes {
    last: HashMap<u32, String>,
}

impl FiredMinutes {
    pub(crate) fn new() -> Self {
        Self {
            last: HashMap::new(),
        }
    }

    /// True when `(id, minute)` has not fired yet; records the fire.
    fn mark(&mut self, id: u32, minute: &str) -> bool {
        match self.last.get(&id) {
            Some(m) if m == minute => false,
            _ => {
                self.last.insert(id, minute.to_string());
                true
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Pure evaluation
// ---------------------------------------------------------------------------

/// "YYYY-MM-DD HH:MM" dedupe token.
pub(crate) fn minute_stamp(now: OffsetDateTime) -> String {
    format!(
        "{:04}-{:02}-{:02} {:02}:{:02}",
        now.year(),
        now.month() as u8,
        now.day(),
        now.hour(),
        now.minute()
    )
}

/// Weekday as stored in alarm records: 0 = Monday .. 6 = Sunday.
pub(crate) fn weekday_index(now: OffsetDateTime) -> u8 {
    now.weekday().number_days_from_monday()
}

/// Alarms matching the current minute: active, time equal, weekday
/// listed (or every-day).  Records with malformed times never match.
pub(crate) fn due_alarms(alarms: &[Alarm], now: OffsetDateTime) -> Vec<Alarm> {
    let current = (now.hour(), now.minute());
    let weekday = weekday_index(now);
    alarms
        .iter()
        .filter(|a| a.active)
        .filter(|a| a.parse_time() == Some(current))
        .filter(|a| a.rings_on(weekday))
        .cloned()
        .collect()
}

/// One evaluator pass: due alarms minus those already fired this
/// minute.  The returned alarms are the ones to actually trigger.
pub(crate) fn fire_pass(
    alarms: &[Alarm],
    now: OffsetDateTime,
    fired: &mut FiredMinutes,
) -> Vec<Alarm> {
    let minute = minute_stamp(now);
    due_alarms(alarms, now)
        .into_iter()
        .filter(|a| fired.mark(a.id, &minute))
        .collect()
}

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Run the evaluator loop.  Intended to be `tokio::spawn`-ed from main.
pub async fn run(
    store: SharedStore,
    shared: SharedState,
    mqtt: AsyncClient,
    weather: Option<WeatherService>,
    poll_interval: Duration,
) {
    let mut fired = FiredMinutes::new();
    let mut ticker = tokio::time::interval(poll_interval);

    info!(poll = ?poll_interval, "schedule evaluator started");
    {
        let mut st = shared.write().await;
        st.record_scheduler(format!("evaluator started (poll {poll_interval:?})"));
    }

    loop {
        ticker.tick().await;

        let now = OffsetDateTime::now_local().unwrap_or_else(|_| OffsetDateTime::now_utc());

        // Snapshot under the read lock, release before any await.
        let alarms: Vec<Alarm> = {
            let st = store.read().await;
            st.list().to_vec()
        };

        for alarm in fire_pass(&alarms, now, &mut fired) {
            info!(id = alarm.id, time = %alarm.time, "alarm due, firing");
            {
                let mut st = shared.write().await;
                st.record_scheduler(format!("alarm {} due at {}", alarm.id, alarm.time));
            }

            // The weather tag is decorative: failure to fetch must never
            // block the trigger.
            if let Some(ws) = &weather {
                match ws.current().await {
                    Ok(condition) => {
                        if let Err(e) = publish(&mqtt, &Command::WeatherTag(condition)).await {
                            warn!("failed to publish weather tag: {e}");
                        }
                    }
                    Err(e) => warn!("weather lookup failed: {e:#}"),
                }
            }

            match publish(&mqtt, &Command::TriggerAlarm).await {
                Ok(()) => {
                    let mut st = shared.write().await;
                    st.alarm_triggered = true;
                    st.record_alarm(format!("triggered by schedule (alarm {})", alarm.id));
                }
                Err(e) => {
                    warn!(id = alarm.id, "failed to publish trigger: {e}");
                    let mut st = shared.write().await;
                    st.record_error(format!("trigger publish failed: {e}"));
                }
            }
        }
    }
}

async fn publish(mqtt: &AsyncClient, cmd: &Command) -> Result<(), rumqttc::ClientError> {
    mqtt.publish(cmd.topic(), QoS::AtLeastOnce, false, cmd.to_payload())
        .await
}

// ===========================================================================
// Tests
// ===========================================================================
