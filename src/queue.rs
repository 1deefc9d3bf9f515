use rand::seq::SliceRandom;
use std::collections::VecDeque;
use tracing::debug;

use crate::error::MusicError;
use crate::sources::Song;

/// Cola de reproducción de una sesión.
///
/// El orden de inserción es el orden de reproducción. El índice 0 es la
/// canción activa (o la próxima si no hay nada sonando): solo el controlador
/// hace pop del head, y el head nunca es destino válido de mover/eliminar.
#[derive(Debug, Default)]
pub struct SongQueue {
    items: VecDeque<Song>,
}

impl SongQueue {
    pub fn new() -> Self {
        Self {
            items: VecDeque::new(),
        }
    }

    /// Agrega una canción al final de la cola.
    pub fn push(&mut self, song: Song) {
        debug!("➕ Agregado a la cola: {}", song.title);
        self.items.push_back(song);
    }

    /// Saca la canción activa. Solo el controlador llama esto, al terminar
    /// la reproducción de la canción.
    pub fn pop_head(&mut self) -> Option<Song> {
        self.items.pop_front()
    }

    pub fn peek_head(&self) -> Option<&Song> {
        self.items.front()
    }

    /// Acceso mutable al head, solo para reemplazar su stream link al
    /// renovarlo.
    pub fn peek_head_mut(&mut self) -> Option<&mut Song> {
        self.items.front_mut()
    }

    pub fn get(&self, index: usize) -> Option<&Song> {
        self.items.get(index)
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn clear(&mut self) {
        debug!("🗑️ Cola limpiada ({} canciones)", self.items.len());
        self.items.clear();
    }

    /// Elimina la canción en `index`. El índice 0 siempre se rechaza: la
    /// canción activa se termina con skip/stop, no se elimina de la cola.
    pub fn remove_at(&mut self, index: usize) -> Result<Song, MusicError> {
        if index == 0 || index >= self.items.len() {
            return Err(MusicError::Bounds {
                index,
                len: self.items.len(),
            });
        }

        let song = self
            .items
            .remove(index)
            .ok_or(MusicError::Bounds {
                index,
                len: self.items.len(),
            })?;
        debug!("❌ Eliminado de la cola [{}]: {}", index, song.title);
        Ok(song)
    }

    /// Mueve una canción de `from` a `to`. Ningún extremo puede ser 0.
    pub fn move_to(&mut self, from: usize, to: usize) -> Result<(), MusicError> {
        let len = self.items.len();
        if from == 0 || from >= len {
            return Err(MusicError::Bounds { index: from, len });
        }
        if to == 0 || to >= len {
            return Err(MusicError::Bounds { index: to, len });
        }

        if from != to {
            let song = self
                .items
                .remove(from)
                .ok_or(MusicError::Bounds { index: from, len })?;
            self.items.insert(to, song);
            debug!("📍 Canción movida de la posición {} a la {}", from, to);
        }

        Ok(())
    }

    /// Mezcla uniformemente todo menos el head, que queda en su lugar.
    pub fn shuffle_rest(&mut self) {
        if self.items.len() <= 1 {
            return;
        }

        let mut rest: Vec<Song> = self.items.drain(1..).collect();
        rest.shuffle(&mut rand::thread_rng());
        self.items.extend(rest);
        debug!("🔀 Cola mezclada ({} canciones después del head)", self.items.len() - 1);
    }

    /// Copia ordenada de la cola para mostrar. El índice 0 es la canción
    /// activa; `requested_by` viaja en cada entrada para que la capa de
    /// comandos aplique su política de mover/eliminar.
    pub fn snapshot(&self) -> Vec<Song> {
        self.items.iter().cloned().collect()
    }
}
