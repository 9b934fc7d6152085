//! Abstraction de l'horloge
//!
//! Les enregistrements de trafic sont horodatés avec une horloge monotone.
//! L'heure calendaire n'est calculée qu'au moment de produire un rapport.

use chrono::{DateTime, Local};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// Source de temps monotone
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;

    /// Convertit un instant monotone en heure locale, relativement à maintenant
    fn to_local(&self, instant: Instant) -> DateTime<Local> {
        let now = self.now();
        let wall = Local::now();
        if instant <= now {
            let age = chrono::Duration::from_std(now - instant).unwrap_or(chrono::Duration::zero());
            wall - age
        } else {
            let ahead = chrono::Duration::from_std(instant - now).unwrap_or(chrono::Duration::zero());
            wall + ahead
        }
    }
}

/// Horloge système réelle
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> Instant {
        Instant::now()
    }
}

/// Horloge manuelle pour les tests: le temps n'avance que sur demande
#[derive(Debug)]
pub struct ManualClock {
    current: Mutex<Instant>,
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualClock {
    pub fn new() -> Self {
        Self {
            current: Mutex::new(Instant::now()),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut current = self.current.lock().unwrap_or_else(|e| e.into_inner());
        *current += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Instant {
        *self.current.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_only_moves_on_advance() {
        let clock = ManualClock::new();
        let t0 = clock.now();
        assert_eq!(clock.now(), t0);

        clock.advance(Duration::from_secs(61));
        assert_eq!(clock.now() - t0, Duration::from_secs(61));
    }

    #[test]
    fn test_to_local_places_past_instants_in_the_past() {
        let clock = ManualClock::new();
        let t0 = clock.now();
        clock.advance(Duration::from_secs(30));

        let local = clock.to_local(t0);
        let age = Local::now() - local;
        assert!(age >= chrono::Duration::seconds(29));
        assert!(age <= chrono::Duration::seconds(31));
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock;
        let t1 = clock.now();
        let t2 = clock.now();
        assert!(t2 >= t1);
    }
}
