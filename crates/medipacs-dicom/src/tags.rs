//! 索引关心的DICOM标签名
//!
//! 主标签列表决定各层级资源入库时固化哪些标签。

// 患者层
pub const PATIENT_ID: &str = "PatientID";
pub const PATIENT_NAME: &str = "PatientName";
pub const PATIENT_BIRTH_DATE: &str = "PatientBirthDate";
pub const PATIENT_SEX: &str = "PatientSex";

// 检查层
pub const STUDY_INSTANCE_UID: &str = "StudyInstanceUID";
pub const STUDY_DATE: &str = "StudyDate";
pub const STUDY_TIME: &str = "StudyTime";
pub const STUDY_ID: &str = "StudyID";
pub const STUDY_DESCRIPTION: &str = "StudyDescription";
pub const ACCESSION_NUMBER: &str = "AccessionNumber";
pub const REFERRING_PHYSICIAN_NAME: &str = "ReferringPhysicianName";

// 系列层
pub const SERIES_INSTANCE_UID: &str = "SeriesInstanceUID";
pub const SERIES_NUMBER: &str = "SeriesNumber";
pub const SERIES_DESCRIPTION: &str = "SeriesDescription";
pub const MODALITY: &str = "Modality";
pub const BODY_PART_EXAMINED: &str = "BodyPartExamined";
pub const NUMBER_OF_SLICES: &str = "NumberOfSlices";
pub const IMAGES_IN_ACQUISITION: &str = "ImagesInAcquisition";
pub const CARDIAC_NUMBER_OF_IMAGES: &str = "CardiacNumberOfImages";

// 实例层
pub const SOP_INSTANCE_UID: &str = "SOPInstanceUID";
pub const INSTANCE_NUMBER: &str = "InstanceNumber";
pub const IMAGE_INDEX: &str = "ImageIndex";

/// 患者层主标签
pub const PATIENT_MAIN_TAGS: &[&str] = &[PATIENT_ID, PATIENT_NAME, PATIENT_BIRTH_DATE, PATIENT_SEX];

/// 检查层主标签
pub const STUDY_MAIN_TAGS: &[&str] = &[
    STUDY_INSTANCE_UID,
    STUDY_DATE,
    STUDY_TIME,
    STUDY_ID,
    STUDY_DESCRIPTION,
    ACCESSION_NUMBER,
    REFERRING_PHYSICIAN_NAME,
];

/// 系列层主标签
pub const SERIES_MAIN_TAGS: &[&str] = &[
    SERIES_INSTANCE_UID,
    SERIES_NUMBER,
    SERIES_DESCRIPTION,
    MODALITY,
    BODY_PART_EXAMINED,
    NUMBER_OF_SLICES,
    IMAGES_IN_ACQUISITION,
    CARDIAC_NUMBER_OF_IMAGES,
];

/// 实例层主标签
pub const INSTANCE_MAIN_TAGS: &[&str] = &[SOP_INSTANCE_UID, INSTANCE_NUMBER, IMAGE_INDEX];
