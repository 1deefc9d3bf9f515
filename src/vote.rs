use serenity::model::id::UserId;
use std::collections::HashSet;
use tracing::debug;

/// Acción sometida a votación.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteKind {
    Skip,
    Stop,
}

impl VoteKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteKind::Skip => "skip",
            VoteKind::Stop => "stop",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteChoice {
    Approve,
    Reject,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// El lado del "no" alcanzó el quórum.
    Outvoted,
    /// Todos votaron sin alcanzar un umbral decisivo; el empate favorece
    /// el statu quo.
    Indecisive,
    /// Se agotó el plazo sin decisión.
    TimedOut,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoteOutcome {
    Pending,
    Approved,
    Rejected(RejectReason),
}

impl VoteOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, VoteOutcome::Pending)
    }
}

/// Estado de una votación pendiente.
///
/// Máquina de estados pura, sin timers: el controlador arma el deadline por
/// fuera y llama [`VoteSession::timed_out`] cuando vence. La elegibilidad se
/// congela al crear la sesión; quien entra al canal a mitad de votación no
/// vota, quien sale sigue contando para el quórum pero ya no emite voto.
#[derive(Debug)]
pub struct VoteSession {
    kind: VoteKind,
    eligible: HashSet<UserId>,
    voted: HashSet<UserId>,
    approvals: usize,
    rejections: usize,
}

impl VoteSession {
    pub fn new(kind: VoteKind, eligible: impl IntoIterator<Item = UserId>) -> Self {
        let eligible: HashSet<UserId> = eligible.into_iter().collect();
        debug!(
            "🗳️ Votación de {} iniciada con {} participantes elegibles",
            kind.as_str(),
            eligible.len()
        );
        Self {
            kind,
            eligible,
            voted: HashSet::new(),
            approvals: 0,
            rejections: 0,
        }
    }

    pub fn kind(&self) -> VoteKind {
        self.kind
    }

    pub fn eligible_count(&self) -> usize {
        self.eligible.len()
    }

    pub fn approvals(&self) -> usize {
        self.approvals
    }

    /// Votos a favor que faltan para aprobar.
    pub fn approvals_needed(&self) -> usize {
        let n = self.eligible.len();
        let threshold = match self.kind {
            VoteKind::Skip => n / 2 + 1,
            VoteKind::Stop => n,
        };
        threshold.saturating_sub(self.approvals)
    }

    /// Registra un voto y devuelve el estado resultante. Votos duplicados y
    /// votos de participantes no elegibles se ignoran.
    pub fn cast(&mut self, participant: UserId, choice: VoteChoice) -> VoteOutcome {
        if !self.eligible.contains(&participant) {
            debug!("🗳️ Voto ignorado de participante no elegible: {}", participant);
            return self.evaluate();
        }
        if !self.voted.insert(participant) {
            debug!("🗳️ Voto duplicado ignorado de: {}", participant);
            return self.evaluate();
        }

        match choice {
            VoteChoice::Approve => self.approvals += 1,
            VoteChoice::Reject => self.rejections += 1,
        }

        self.evaluate()
    }

    /// Resultado al vencer el plazo sin decisión.
    pub fn timed_out(&self) -> VoteOutcome {
        VoteOutcome::Rejected(RejectReason::TimedOut)
    }

    fn evaluate(&self) -> VoteOutcome {
        let n = self.eligible.len();

        match self.kind {
            // Mayoría estricta, simétrica en ambos lados.
            VoteKind::Skip => {
                if self.approvals > n / 2 {
                    return VoteOutcome::Approved;
                }
                if self.rejections > n / 2 {
                    return VoteOutcome::Rejected(RejectReason::Outvoted);
                }
            }
            // Unanimidad, simétrica en ambos lados.
            VoteKind::Stop => {
                if n > 0 && self.approvals == n {
                    return VoteOutcome::Approved;
                }
                if n > 0 && self.rejections == n {
                    return VoteOutcome::Rejected(RejectReason::Outvoted);
                }
            }
        }

        // Todos votaron y nadie alcanzó un umbral: no se actúa.
        if self.voted.len() == n {
            return VoteOutcome::Rejected(RejectReason::Indecisive);
        }

        VoteOutcome::Pending
    }
}
