//! Built-in term catalogue, Portuguese and English.
//!
//! Terms are written already folded (no accents, lowercase). Each criterion
//! merges the sub-criteria the scoring rubric is derived from.

use crate::model::CriterionCode;

const PROTEIN_PRODUCTION: &[&str] = &[
    // expression and purification
    "expressao proteina",
    "purificacao proteina",
    "proteina recombinante",
    "antigeno recombinante",
    "expressao heterologa",
    "producao proteinas",
    "protein expression",
    "protein purification",
    "recombinant protein",
    // enzymes
    "enzimas biotecnologicas",
    "caracterizacao enzimas",
    "purificacao enzimas",
    "biocatalise",
    "enzimas industriais",
    "biotechnological enzymes",
    "enzyme characterization",
    "enzyme purification",
    "biocatalysis",
    // assays
    "elisa",
    "western blot",
    "biossensores",
    "imunoensaios",
    "triagem farmacos",
    "imunizacao",
    "bioquimica proteinas",
    "interacoes proteicas",
    "biosensors",
    "immunoassays",
    "drug screening",
    "protein biochemistry",
    // analytics
    "cromatografia",
    "espectrometria massas",
    "modelagem estrutural",
    "hplc",
    "analise instrumental",
    "proteomica",
    "chromatography",
    "mass spectrometry",
    "structural modeling",
    "proteomics",
];

const GENE_SYNTHESIS: &[&str] = &[
    "sintese genica",
    "expressao genica",
    "construcao genica",
    "gene synthesis",
    "gene expression",
    "gene construction",
    "clonagem molecular",
    "clonagem genica",
    "pcr",
    "crispr",
    "edicao genetica",
    "molecular cloning",
    "gene editing",
    "genetic engineering",
    "circuito genetico",
    "chassis bacteriano",
    "engenharia metabolica",
    "biologia sintetica",
    "genetic circuits",
    "synthetic biology",
    "metabolic engineering",
];

const CELL_FREE: &[&str] = &[
    "cfps",
    "cell-free",
    "sintese livre celula",
    "sistema acelular",
    "cell-free protein synthesis",
    "in vitro protein synthesis",
    "proteinas toxicas",
    "proteinas dificeis",
    "proteinas recalcitrantes",
    "toxic proteins",
    "difficult proteins",
    "recalcitrant proteins",
    "screening farmacos",
    "triagem medicamentos",
    "descoberta drogas",
    "validacao expressao",
    "drug screening",
    "drug discovery",
    "educacao",
    "ensino",
    "didatica",
    "educacional",
    "education",
    "teaching",
    "educational applications",
    "cristalografia proteinas",
    "estrutura proteinas",
    "cristais proteina",
    "difracao raios x",
    "protein crystallography",
    "x-ray diffraction",
];

const GROWTH_FACTORS: &[&str] = &[
    "cultura celular",
    "cultivo celulas",
    "diferenciacao celular",
    "celulas-tronco",
    "ipscs",
    "cell culture",
    "stem cells",
    "fermentacao",
    "biorreatores",
    "crescimento celular",
    "producao biomassa",
    "fermentation",
    "bioreactors",
    "biomass production",
    "embriologia",
    "reproducao assistida",
    "fertilizacao in vitro",
    "desenvolvimento embrionario",
    "embryology",
    "assisted reproduction",
    "engenharia tecidos",
    "bioimpressao",
    "scaffolds",
    "medicina regenerativa",
    "tissue engineering",
    "bioprinting",
    "regenerative medicine",
];

const NO_RECOMBINANT_PROTEIN: &[&str] = &[
    "sem proteinas",
    "nao usa proteinas",
    "area teorica",
    "matematica aplicada",
    "fisica teorica",
    "quimica inorganica",
    "without proteins",
    "theoretical area",
];

const NON_BIOTECH: &[&str] = &[
    "nao biotecnologia",
    "area distante",
    "engenharia civil",
    "psicologia",
    "administracao",
    "direito",
    "not biotechnology",
    "distant area",
];

pub fn terms_for(code: CriterionCode) -> &'static [&'static str] {
    match code {
        CriterionCode::ProteinProduction => PROTEIN_PRODUCTION,
        CriterionCode::GeneSynthesis => GENE_SYNTHESIS,
        CriterionCode::CellFree => CELL_FREE,
        CriterionCode::GrowthFactors => GROWTH_FACTORS,
        CriterionCode::NoRecombinantProtein => NO_RECOMBINANT_PROTEIN,
        CriterionCode::NonBiotech => NON_BIOTECH,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::normalize::fold;
    use std::collections::HashSet;

    #[test]
    fn catalogue_terms_are_prefolded_and_unique_per_code() {
        for code in CriterionCode::ALL {
            let terms = terms_for(code);
            assert!(!terms.is_empty(), "{code} has no terms");
            let mut seen = HashSet::new();
            for t in terms {
                assert_eq!(fold(t), *t, "term '{t}' is not folded");
                assert!(seen.insert(*t), "duplicate term '{t}' in {code}");
            }
        }
    }
}
