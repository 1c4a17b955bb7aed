//! Ringpuffer fester Tiefe fuer den adaptiven Sendemodus
//!
//! Ist der Puffer voll, ueberschreibt ein neuer Eintrag den aeltesten.

use std::collections::VecDeque;

#[derive(Debug, Clone)]
pub struct Ringpuffer<T> {
    eintraege: VecDeque<T>,
    kapazitaet: usize,
}

impl<T> Ringpuffer<T> {
    /// Kapazitaet 0 wird auf 1 angehoben
    pub fn neu(kapazitaet: usize) -> Self {
        let kapazitaet = kapazitaet.max(1);
        Self {
            eintraege: VecDeque::with_capacity(kapazitaet),
            kapazitaet,
        }
    }

    /// Legt einen Eintrag ab; gibt den ueberschriebenen zurueck
    pub fn hinzufuegen(&mut self, eintrag: T) -> Option<T> {
        let verdraengt = if self.eintraege.len() == self.kapazitaet {
            self.eintraege.pop_front()
        } else {
            None
        };
        self.eintraege.push_back(eintrag);
        verdraengt
    }

    /// Entnimmt den aeltesten Eintrag
    pub fn entnehmen(&mut self) -> Option<T> {
        self.eintraege.pop_front()
    }

    pub fn leeren(&mut self) {
        self.eintraege.clear();
    }

    pub fn len(&self) -> usize {
        self.eintraege.len()
    }

    pub fn is_empty(&self) -> bool {
        self.eintraege.is_empty()
    }

    pub fn kapazitaet(&self) -> usize {
        self.kapazitaet
    }
}
