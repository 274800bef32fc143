//! Movement-kind inference and the movement/reporting-group compatibility table.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::{ReportingGroup, TransactionContext};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementKind {
    OperatingRevenue,
    RevenueDeduction,
    DirectCost,
    OperatingExpense,
    Financial,
    NonOperating,
    Investment,
    InternalTransfer,
}

impl MovementKind {
    pub const ALL: [MovementKind; 8] = [
        MovementKind::OperatingRevenue,
        MovementKind::RevenueDeduction,
        MovementKind::DirectCost,
        MovementKind::OperatingExpense,
        MovementKind::Financial,
        MovementKind::NonOperating,
        MovementKind::Investment,
        MovementKind::InternalTransfer,
    ];

    pub fn label(self) -> &'static str {
        match self {
            MovementKind::OperatingRevenue => "operating revenue",
            MovementKind::RevenueDeduction => "revenue deduction",
            MovementKind::DirectCost => "direct cost",
            MovementKind::OperatingExpense => "operating expense",
            MovementKind::Financial => "financial movement",
            MovementKind::NonOperating => "non-operating movement",
            MovementKind::Investment => "investment movement",
            MovementKind::InternalTransfer => "internal transfer",
        }
    }

    /// Reporting groups a movement of this kind may be presented under.
    pub fn allowed_groups(self) -> &'static [ReportingGroup] {
        use ReportingGroup::*;
        match self {
            MovementKind::InternalTransfer => &[Transfers, Other],
            MovementKind::Investment => &[FinancialResult, Transfers, Other],
            MovementKind::Financial => &[
                FinancialResult,
                Loans,
                FixedCost,
                NonOperatingRevenue,
                NonOperatingExpense,
                Other,
            ],
            MovementKind::DirectCost => &[CostOfGoods, VariableCost, Other],
            MovementKind::RevenueDeduction => &[RevenueDeductions, GrossRevenue, Other],
            MovementKind::NonOperating => &[NonOperatingRevenue, NonOperatingExpense, Other],
            MovementKind::OperatingRevenue => &[
                GrossRevenue,
                RevenueDeductions,
                NonOperatingRevenue,
                FinancialResult,
                Loans,
                ProfitDistribution,
                Transfers,
                Other,
            ],
            MovementKind::OperatingExpense => &[
                RevenueDeductions,
                CostOfGoods,
                VariableCost,
                FixedCost,
                NonOperatingExpense,
                FinancialResult,
                IncomeTaxes,
                ProfitDistribution,
                Loans,
                Transfers,
                Other,
            ],
        }
    }

    pub fn allows(self, group: ReportingGroup) -> bool {
        self.allowed_groups().contains(&group)
    }
}

impl fmt::Display for MovementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

const INTERNAL_TRANSFER_TERMS: &[&str] = &[
    "TRANSFERENCIA ENTRE CONTAS",
    "TRANSF MESMA TITULARIDADE",
    "TED MESMA TITULARIDADE",
    "DOC MESMA TITULARIDADE",
    "PIX MESMA TITULARIDADE",
    "APLICACAO FINANCEIRA",
    "RESGATE AUTOMATICO",
    "TRANSFER BETWEEN ACCOUNTS",
    "INTERNAL TRANSFER",
];

const FINANCIAL_TERMS: &[&str] = &[
    "TARIFA BANCARIA",
    "IOF",
    "JUROS SOBRE",
    "MORA",
    "COMISSAO",
    "CUSTODIA",
    "MANUTENCAO DE CONTA",
    "BANK FEE",
    "INTEREST CHARGE",
];

const INVESTMENT_TERMS: &[&str] = &[
    "COMPRA DE ACOES",
    "RESGATE DE FUNDOS",
    "APLICACAO CDB",
    "INVESTIMENTO",
    "TESOURO DIRETO",
    "INVESTMENT",
];

const LOAN_TERMS: &[&str] = &[
    "EMPRESTIMO",
    "FINANCIAMENTO",
    "CAPITAL DE GIRO",
    "PRONAMPE",
    "MUTUO",
    "FOMENTO",
    "LOAN",
];

const RECEIVABLE_ADVANCE_TERMS: &[&str] = &[
    "ANTECIPACAO",
    "DESCONTO DE DUPLICATA",
    "DESCONTO DE CHEQUE",
    "FACTORING",
];

const DEDUCTION_TERMS: &[&str] = &[
    "ESTORNO DE VENDA",
    "DEVOLUCAO DE CLIENTE",
    "CANCELAMENTO DE VENDA",
    "CUSTOMER REFUND",
];

const NON_OPERATING_REVENUE_TERMS: &[&str] = &[
    "VENDA DE ATIVO",
    "ALIENACAO DE BENS",
    "RESTITUICAO IRPJ",
    "ASSET SALE",
];

const DIRECT_COST_TERMS: &[&str] = &[
    "FORNECEDOR",
    "COMPRA MATERIA PRIMA",
    "FRETE SOBRE COMPRA",
    "EMBALAGENS",
    "SUPPLIER",
    "RAW MATERIAL",
];

fn mentions(text: &str, terms: &[&str]) -> bool {
    terms.iter().any(|term| text.contains(term))
}

/// Infer the movement kind from keywords in description and memo, then the amount sign.
pub fn infer_movement(context: &TransactionContext) -> MovementKind {
    let text = context.full_text().to_uppercase();

    if mentions(&text, INTERNAL_TRANSFER_TERMS) {
        return MovementKind::InternalTransfer;
    }
    if mentions(&text, FINANCIAL_TERMS) {
        return MovementKind::Financial;
    }
    if mentions(&text, INVESTMENT_TERMS) {
        return MovementKind::Investment;
    }
    if mentions(&text, LOAN_TERMS) || mentions(&text, RECEIVABLE_ADVANCE_TERMS) {
        return MovementKind::Financial;
    }

    if context.amount > 0.0 {
        if mentions(&text, NON_OPERATING_REVENUE_TERMS) {
            MovementKind::NonOperating
        } else {
            MovementKind::OperatingRevenue
        }
    } else if mentions(&text, DEDUCTION_TERMS) {
        MovementKind::RevenueDeduction
    } else if mentions(&text, DIRECT_COST_TERMS) {
        MovementKind::DirectCost
    } else {
        MovementKind::OperatingExpense
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kind(description: &str, amount: f64) -> MovementKind {
        infer_movement(&TransactionContext::new(description, amount))
    }

    #[test]
    fn test_transfer_terms_take_priority() {
        assert_eq!(kind("TED MESMA TITULARIDADE 0001", -1000.0), MovementKind::InternalTransfer);
        assert_eq!(kind("Internal transfer to savings", 200.0), MovementKind::InternalTransfer);
    }

    #[test]
    fn test_financial_and_loans() {
        assert_eq!(kind("TARIFA BANCARIA PACOTE", -45.0), MovementKind::Financial);
        assert_eq!(kind("CREDITO EMPRESTIMO PRONAMPE", 50_000.0), MovementKind::Financial);
        assert_eq!(kind("ANTECIPACAO RECEBIVEIS", 8_000.0), MovementKind::Financial);
    }

    #[test]
    fn test_investment() {
        assert_eq!(kind("APLICACAO CDB DI", -10_000.0), MovementKind::Investment);
    }

    #[test]
    fn test_sign_defaults() {
        assert_eq!(kind("PIX RECEBIDO CLIENTE", 1200.0), MovementKind::OperatingRevenue);
        assert_eq!(kind("VENDA DE ATIVO VEICULO", 30_000.0), MovementKind::NonOperating);
        assert_eq!(kind("PAGTO FORNECEDOR XPTO", -900.0), MovementKind::DirectCost);
        assert_eq!(kind("ESTORNO DE VENDA 123", -150.0), MovementKind::RevenueDeduction);
        assert_eq!(kind("PADARIA CENTRAL", -12.0), MovementKind::OperatingExpense);
    }

    #[test]
    fn test_memo_participates() {
        let ctx = TransactionContext::new("PIX ENVIADO", -500.0).with_memo("pagamento fornecedor");
        assert_eq!(infer_movement(&ctx), MovementKind::DirectCost);
    }

    #[test]
    fn test_compatibility_table() {
        assert!(!MovementKind::InternalTransfer.allows(ReportingGroup::FixedCost));
        assert!(!MovementKind::Investment.allows(ReportingGroup::NonOperatingRevenue));
        assert!(MovementKind::DirectCost.allows(ReportingGroup::CostOfGoods));
        assert!(!MovementKind::Financial.allows(ReportingGroup::GrossRevenue));
    }

    #[test]
    fn test_every_kind_accepts_other() {
        for k in MovementKind::ALL {
            assert!(k.allows(ReportingGroup::Other), "{k} should accept the neutral group");
        }
    }
}
